use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The revenue tier a customer falls into. Always derived from ARR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentTier {
    Enterprise,
    MidMarket,
    Smb,
}

impl SegmentTier {
    pub const ALL: [SegmentTier; 3] = [SegmentTier::Enterprise, SegmentTier::MidMarket, SegmentTier::Smb];

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentTier::Enterprise => "enterprise",
            SegmentTier::MidMarket => "mid-market",
            SegmentTier::Smb => "smb",
        }
    }
}

impl fmt::Display for SegmentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentTier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enterprise" => Ok(SegmentTier::Enterprise),
            "mid-market" => Ok(SegmentTier::MidMarket),
            "smb" => Ok(SegmentTier::Smb),
            other => Err(CoreError::UnknownVariant { kind: "segment", value: other.to_string() }),
        }
    }
}

/// Where a customer sits in its lifecycle, as reported by the CRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleStage {
    New,
    Active,
    AtRisk,
    Expanding,
    Churned,
}

impl LifecycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::New => "new",
            LifecycleStage::Active => "active",
            LifecycleStage::AtRisk => "at-risk",
            LifecycleStage::Expanding => "expanding",
            LifecycleStage::Churned => "churned",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleStage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LifecycleStage::New),
            "active" => Ok(LifecycleStage::Active),
            "at-risk" => Ok(LifecycleStage::AtRisk),
            "expanding" => Ok(LifecycleStage::Expanding),
            "churned" => Ok(LifecycleStage::Churned),
            other => Err(CoreError::UnknownVariant { kind: "lifecycle stage", value: other.to_string() }),
        }
    }
}

/// The classification of a single ARR change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    New,
    Expansion,
    Contraction,
    Churn,
    Reactivation,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::New => "new",
            MovementType::Expansion => "expansion",
            MovementType::Contraction => "contraction",
            MovementType::Churn => "churn",
            MovementType::Reactivation => "reactivation",
        }
    }

    /// The attribution source implied by this movement type.
    pub fn source(&self) -> MovementSource {
        match self {
            MovementType::New => MovementSource::NewBusiness,
            MovementType::Expansion => MovementSource::Upsell,
            MovementType::Contraction => MovementSource::Downsell,
            MovementType::Churn => MovementSource::Churn,
            MovementType::Reactivation => MovementSource::Reactivation,
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(MovementType::New),
            "expansion" => Ok(MovementType::Expansion),
            "contraction" => Ok(MovementType::Contraction),
            "churn" => Ok(MovementType::Churn),
            "reactivation" => Ok(MovementType::Reactivation),
            other => Err(CoreError::UnknownVariant { kind: "movement type", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementSource {
    NewBusiness,
    Upsell,
    Downsell,
    Churn,
    Reactivation,
}

impl MovementSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementSource::NewBusiness => "new_business",
            MovementSource::Upsell => "upsell",
            MovementSource::Downsell => "downsell",
            MovementSource::Churn => "churn",
            MovementSource::Reactivation => "reactivation",
        }
    }
}

impl fmt::Display for MovementSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A numeric customer field that can be benchmarked.
///
/// Parsing is the whitelist: a name that does not map to a variant is an
/// `InvalidMetric`, never a fallback to some default field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Arr,
    HealthScore,
    NpsScore,
    UsageScore,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Arr, Metric::HealthScore, Metric::NpsScore, Metric::UsageScore];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Arr => "arr",
            Metric::HealthScore => "health_score",
            Metric::NpsScore => "nps_score",
            Metric::UsageScore => "usage_score",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arr" => Ok(Metric::Arr),
            "health_score" => Ok(Metric::HealthScore),
            "nps_score" => Ok(Metric::NpsScore),
            "usage_score" => Ok(Metric::UsageScore),
            other => Err(CoreError::InvalidMetric(other.to_string())),
        }
    }
}

/// The comparison set a percentile is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonScope {
    #[default]
    Portfolio,
    Segment,
}

impl ComparisonScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonScope::Portfolio => "portfolio",
            ComparisonScope::Segment => "segment",
        }
    }
}

impl fmt::Display for ComparisonScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonScope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "portfolio" => Ok(ComparisonScope::Portfolio),
            "segment" => Ok(ComparisonScope::Segment),
            other => Err(CoreError::UnknownVariant { kind: "comparison scope", value: other.to_string() }),
        }
    }
}
