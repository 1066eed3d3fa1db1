//! # Pulse Percentiles
//!
//! The Percentile Calculator: where one customer sits among its peers for a
//! benchmarked metric, plus the append-only history of those answers.

use analytics::percentile_rank;
use benchmarks::BenchmarkCache;
use chrono::Utc;
use core_types::{ComparisonScope, CustomerPercentile, Metric, PercentileResult};
use database::{CustomerStore, PercentileStore};
use std::sync::Arc;
use uuid::Uuid;

pub mod error;

pub use error::PercentileError;

/// Upper bound on history rows returned in one call.
pub const MAX_HISTORY_LIMIT: i64 = 365;

pub struct PercentileCalculator {
    customers: Arc<dyn CustomerStore>,
    history: Arc<dyn PercentileStore>,
    benchmarks: Arc<BenchmarkCache>,
    min_confidence_sample: i64,
}

impl PercentileCalculator {
    pub fn new(
        customers: Arc<dyn CustomerStore>,
        history: Arc<dyn PercentileStore>,
        benchmarks: Arc<BenchmarkCache>,
        min_confidence_sample: i64,
    ) -> Self {
        Self { customers, history, benchmarks, min_confidence_sample }
    }

    /// Ranks a customer's current value against the cached distribution for
    /// its comparison set and records the answer in the history.
    ///
    /// The customer is never its own peer. With no peers the percentile is
    /// 50 and flagged low-confidence.
    pub async fn percentile(
        &self,
        customer_id: Uuid,
        metric: Metric,
        scope: ComparisonScope,
    ) -> Result<PercentileResult, PercentileError> {
        self.benchmarks.ensure_metric(metric)?;

        let customer = self
            .customers
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| PercentileError::NotFound(format!("customer {customer_id}")))?;
        let value = customer
            .metric_value(metric)
            .ok_or_else(|| PercentileError::InvalidInput(format!("customer {customer_id} has no {metric} value")))?;

        let segment = match scope {
            ComparisonScope::Portfolio => None,
            ComparisonScope::Segment => Some(customer.segment),
        };

        let read = self.benchmarks.get_or_refresh(metric, segment).await?;
        let entry = read.entry();
        let rank = percentile_rank(&entry.distribution, customer_id, value);

        let result = PercentileResult {
            customer_id,
            metric,
            scope,
            segment,
            value,
            percentile: rank.percentile,
            benchmark_median: entry.stats.median,
            sample_size: rank.sample_size,
            low_confidence: rank.sample_size == 0 || rank.sample_size < self.min_confidence_sample,
            benchmark_calculated_at: entry.calculated_at,
            benchmark_expires_at: entry.expires_at,
        };

        let record = CustomerPercentile::from_result(&result, Utc::now());
        if let Err(err) = self.history.append_percentile(&record).await {
            tracing::warn!(customer_id = %customer_id, metric = %metric, error = %err, "Failed to record percentile history.");
        }

        tracing::debug!(
            customer_id = %customer_id,
            metric = %metric,
            percentile = result.percentile,
            sample_size = result.sample_size,
            stale = read.is_stale(),
            "Percentile calculated."
        );
        Ok(result)
    }

    /// The most recent history rows for a customer and metric, newest first.
    pub async fn history(
        &self,
        customer_id: Uuid,
        metric: Metric,
        limit: i64,
    ) -> Result<Vec<CustomerPercentile>, PercentileError> {
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(PercentileError::InvalidInput(format!(
                "limit must be between 1 and {MAX_HISTORY_LIMIT}, got {limit}"
            )));
        }
        Ok(self.history.percentile_history(customer_id, metric, limit).await?)
    }
}
