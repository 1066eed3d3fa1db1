use chrono::TimeDelta;
use configuration::{BenchmarkSettings, ConfigError};
use core_types::{BenchmarkKey, Metric, SegmentTier};
use std::time::Duration;

/// The validated knobs of a [`crate::BenchmarkCache`].
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub ttl: TimeDelta,
    pub refresh_timeout: Duration,
    pub metrics: Vec<Metric>,
    pub performer_count: usize,
}

impl CachePolicy {
    pub fn from_settings(settings: &BenchmarkSettings) -> Result<Self, ConfigError> {
        let ttl = TimeDelta::from_std(settings.ttl)
            .map_err(|e| ConfigError::ValidationError(format!("benchmarks.ttl: {e}")))?;
        Ok(Self {
            ttl,
            refresh_timeout: settings.refresh_timeout,
            metrics: settings.enabled_metrics()?,
            performer_count: settings.performer_count,
        })
    }

    pub fn allows(&self, metric: Metric) -> bool {
        self.metrics.contains(&metric)
    }

    /// Every key the cache maintains: each enabled metric over the whole
    /// portfolio and over each segment.
    pub fn keys(&self) -> Vec<BenchmarkKey> {
        self.metrics
            .iter()
            .flat_map(|metric| {
                std::iter::once(None)
                    .chain(SegmentTier::ALL.iter().copied().map(Some))
                    .map(move |segment| BenchmarkKey::new(*metric, segment))
            })
            .collect()
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: TimeDelta::hours(24),
            refresh_timeout: Duration::from_secs(30),
            metrics: Metric::ALL.to_vec(),
            performer_count: 5,
        }
    }
}
