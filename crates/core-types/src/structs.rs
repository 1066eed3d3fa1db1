use crate::enums::{ComparisonScope, LifecycleStage, Metric, MovementSource, MovementType, SegmentTier};
use crate::segment::classify;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// The slice of a CRM customer record this core observes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: Uuid,
    pub name: String,
    pub arr: Decimal,
    pub segment: SegmentTier,
    pub lifecycle_stage: LifecycleStage,
    pub health_score: Option<Decimal>,
    pub nps_score: Option<Decimal>,
    pub usage_score: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Creates a customer whose segment is derived from `arr`.
    pub fn new(customer_id: Uuid, name: impl Into<String>, arr: Decimal, lifecycle_stage: LifecycleStage) -> Self {
        Self {
            customer_id,
            name: name.into(),
            arr,
            segment: classify(arr),
            lifecycle_stage,
            health_score: None,
            nps_score: None,
            usage_score: None,
            updated_at: Utc::now(),
        }
    }

    /// Writes a new ARR and re-derives the segment in the same step.
    pub fn set_arr(&mut self, arr: Decimal) {
        self.arr = arr;
        self.segment = classify(arr);
    }

    pub fn is_churned(&self) -> bool {
        self.lifecycle_stage == LifecycleStage::Churned
    }

    /// The customer's current value for a benchmark metric, if it has one.
    pub fn metric_value(&self, metric: Metric) -> Option<Decimal> {
        match metric {
            Metric::Arr => Some(self.arr),
            Metric::HealthScore => self.health_score,
            Metric::NpsScore => self.nps_score,
            Metric::UsageScore => self.usage_score,
        }
    }
}

/// An ARR transition reported by the CRM after it committed the write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrChangeEvent {
    pub customer_id: Uuid,
    pub previous_arr: Option<Decimal>,
    pub new_arr: Decimal,
    pub previous_stage: LifecycleStage,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// One classified row of the revenue ledger. Immutable once written.
///
/// `change_amount` and `source` are derived from the stored fields and are
/// therefore accessors, not fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RevenueMovement {
    pub movement_id: Uuid,
    pub customer_id: Uuid,
    pub movement_date: NaiveDate,
    pub movement_type: MovementType,
    pub previous_arr: Decimal,
    pub new_arr: Decimal,
    pub reason: Option<String>,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

impl RevenueMovement {
    pub fn change_amount(&self) -> Decimal {
        self.new_arr - self.previous_arr
    }

    pub fn source(&self) -> MovementSource {
        self.movement_type.source()
    }
}

impl Serialize for RevenueMovement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RevenueMovement", 11)?;
        state.serialize_field("movement_id", &self.movement_id)?;
        state.serialize_field("customer_id", &self.customer_id)?;
        state.serialize_field("movement_date", &self.movement_date)?;
        state.serialize_field("movement_type", &self.movement_type)?;
        state.serialize_field("previous_arr", &self.previous_arr)?;
        state.serialize_field("new_arr", &self.new_arr)?;
        state.serialize_field("change_amount", &self.change_amount())?;
        state.serialize_field("source", &self.source())?;
        state.serialize_field("reason", &self.reason)?;
        state.serialize_field("recorded_by", &self.recorded_by)?;
        state.serialize_field("created_at", &self.created_at)?;
        state.end()
    }
}

/// Per-segment aggregate inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentStats {
    pub arr: Decimal,
    pub customer_count: i64,
    pub avg_arr: Decimal,
}

/// The portfolio as of one monthly period.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSnapshot {
    pub snapshot_id: Uuid,
    /// First day of the month this snapshot describes.
    pub period: NaiveDate,
    pub total_arr: Decimal,
    pub customer_count: i64,
    pub new_arr: Decimal,
    pub reactivation_arr: Decimal,
    pub expansion_arr: Decimal,
    pub contraction_arr: Decimal,
    pub churn_arr: Decimal,
    pub grr: Decimal,
    pub nrr: Decimal,
    pub segment_breakdown: BTreeMap<SegmentTier, SegmentStats>,
    pub generated_at: DateTime<Utc>,
}

impl PortfolioSnapshot {
    pub fn total_mrr(&self) -> Decimal {
        self.total_arr / Decimal::from(12)
    }
}

impl Serialize for PortfolioSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PortfolioSnapshot", 14)?;
        state.serialize_field("snapshot_id", &self.snapshot_id)?;
        state.serialize_field("period", &self.period)?;
        state.serialize_field("total_arr", &self.total_arr)?;
        state.serialize_field("total_mrr", &self.total_mrr().round_dp(2))?;
        state.serialize_field("customer_count", &self.customer_count)?;
        state.serialize_field("new_arr", &self.new_arr)?;
        state.serialize_field("reactivation_arr", &self.reactivation_arr)?;
        state.serialize_field("expansion_arr", &self.expansion_arr)?;
        state.serialize_field("contraction_arr", &self.contraction_arr)?;
        state.serialize_field("churn_arr", &self.churn_arr)?;
        state.serialize_field("grr", &self.grr)?;
        state.serialize_field("nrr", &self.nrr)?;
        state.serialize_field("segment_breakdown", &self.segment_breakdown)?;
        state.serialize_field("generated_at", &self.generated_at)?;
        state.end()
    }
}

/// Identifies one benchmark: a metric over the whole portfolio or one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BenchmarkKey {
    pub metric: Metric,
    pub segment: Option<SegmentTier>,
}

impl BenchmarkKey {
    pub fn new(metric: Metric, segment: Option<SegmentTier>) -> Self {
        Self { metric, segment }
    }
}

impl fmt::Display for BenchmarkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.segment {
            Some(segment) => write!(f, "{}/{}", self.metric, segment),
            None => write!(f, "{}/portfolio", self.metric),
        }
    }
}

/// Summary statistics of one comparison set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub min: Decimal,
    pub p25: Decimal,
    pub median: Decimal,
    pub p75: Decimal,
    pub max: Decimal,
    pub mean: Decimal,
    pub sample_size: i64,
}

impl DistributionStats {
    /// The statistics of an empty comparison set.
    pub fn empty() -> Self {
        Self {
            min: Decimal::ZERO,
            p25: Decimal::ZERO,
            median: Decimal::ZERO,
            p75: Decimal::ZERO,
            max: Decimal::ZERO,
            mean: Decimal::ZERO,
            sample_size: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performer {
    pub customer_id: Uuid,
    pub name: String,
    pub value: Decimal,
    pub segment: SegmentTier,
}

/// One point of the comparison distribution a benchmark was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSample {
    pub customer_id: Uuid,
    pub value: Decimal,
}

/// A cached benchmark. Always replaced as a whole, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkEntry {
    pub metric: Metric,
    pub segment: Option<SegmentTier>,
    #[serde(flatten)]
    pub stats: DistributionStats,
    pub top_performers: Vec<Performer>,
    pub bottom_performers: Vec<Performer>,
    /// Ascending by value, then customer id.
    #[serde(skip_serializing, default)]
    pub distribution: Vec<BenchmarkSample>,
    pub calculated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl BenchmarkEntry {
    pub fn key(&self) -> BenchmarkKey {
        BenchmarkKey::new(self.metric, self.segment)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// The outcome of a percentile lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileResult {
    pub customer_id: Uuid,
    pub metric: Metric,
    pub scope: ComparisonScope,
    pub segment: Option<SegmentTier>,
    pub value: Decimal,
    pub percentile: i32,
    pub benchmark_median: Decimal,
    /// Number of peers the customer was ranked against (itself excluded).
    pub sample_size: i64,
    pub low_confidence: bool,
    pub benchmark_calculated_at: DateTime<Utc>,
    pub benchmark_expires_at: DateTime<Utc>,
}

impl PercentileResult {
    pub fn gap_to_median(&self) -> Decimal {
        self.value - self.benchmark_median
    }
}

impl Serialize for PercentileResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PercentileResult", 12)?;
        state.serialize_field("customer_id", &self.customer_id)?;
        state.serialize_field("metric", &self.metric)?;
        state.serialize_field("scope", &self.scope)?;
        state.serialize_field("segment", &self.segment)?;
        state.serialize_field("value", &self.value)?;
        state.serialize_field("percentile", &self.percentile)?;
        state.serialize_field("benchmark_median", &self.benchmark_median)?;
        state.serialize_field("gap_to_median", &self.gap_to_median())?;
        state.serialize_field("sample_size", &self.sample_size)?;
        state.serialize_field("low_confidence", &self.low_confidence)?;
        state.serialize_field("benchmark_calculated_at", &self.benchmark_calculated_at)?;
        state.serialize_field("benchmark_expires_at", &self.benchmark_expires_at)?;
        state.end()
    }
}

/// A history row written after every successful percentile lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerPercentile {
    pub percentile_id: Uuid,
    pub customer_id: Uuid,
    pub metric: Metric,
    pub value: Decimal,
    pub percentile: i32,
    pub benchmark_median: Decimal,
    pub scope: ComparisonScope,
    pub segment: Option<SegmentTier>,
    pub sample_size: i64,
    pub calculated_at: DateTime<Utc>,
}

impl CustomerPercentile {
    pub fn from_result(result: &PercentileResult, calculated_at: DateTime<Utc>) -> Self {
        Self {
            percentile_id: Uuid::new_v4(),
            customer_id: result.customer_id,
            metric: result.metric,
            value: result.value,
            percentile: result.percentile,
            benchmark_median: result.benchmark_median,
            scope: result.scope,
            segment: result.segment,
            sample_size: result.sample_size,
            calculated_at,
        }
    }

    pub fn gap_to_median(&self) -> Decimal {
        self.value - self.benchmark_median
    }
}

impl Serialize for CustomerPercentile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CustomerPercentile", 11)?;
        state.serialize_field("percentile_id", &self.percentile_id)?;
        state.serialize_field("customer_id", &self.customer_id)?;
        state.serialize_field("metric", &self.metric)?;
        state.serialize_field("value", &self.value)?;
        state.serialize_field("percentile", &self.percentile)?;
        state.serialize_field("benchmark_median", &self.benchmark_median)?;
        state.serialize_field("gap_to_median", &self.gap_to_median())?;
        state.serialize_field("scope", &self.scope)?;
        state.serialize_field("segment", &self.segment)?;
        state.serialize_field("sample_size", &self.sample_size)?;
        state.serialize_field("calculated_at", &self.calculated_at)?;
        state.end()
    }
}
