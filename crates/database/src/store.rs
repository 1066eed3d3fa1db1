//! Storage seams. Services hold these as `Arc<dyn ...>` so tests can swap the
//! PostgreSQL repository for the in-memory store.

use crate::error::DbError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use core_types::{
    BenchmarkEntry, BenchmarkKey, Customer, CustomerPercentile, LifecycleStage, Metric, PortfolioSnapshot,
    RevenueMovement, SegmentTier,
};
use rust_decimal::Decimal;
use uuid::Uuid;

/// An ARR write issued through the change-detection hook.
#[derive(Debug, Clone)]
pub struct ArrWrite {
    pub customer_id: Uuid,
    pub new_arr: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub recorded_by: String,
    pub reason: Option<String>,
    /// Set for changes the CRM has already committed. The write is applied
    /// only while the mirror still holds `expected.arr`, and the movement is
    /// classified against `expected.stage`.
    pub expected: Option<PriorState>,
}

/// The customer state an external ARR change was made against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorState {
    pub arr: Decimal,
    pub stage: LifecycleStage,
}

impl ArrWrite {
    /// Checks the locked customer row against `expected` and returns the stage
    /// to classify the movement against.
    pub fn prior_stage(&self, stored: &Customer) -> Result<LifecycleStage, DbError> {
        match self.expected {
            None => Ok(stored.lifecycle_stage),
            Some(prior) if prior.arr == stored.arr => Ok(prior.stage),
            Some(prior) => Err(DbError::Conflict(format!(
                "customer {} holds ARR {}, change was made against {}",
                stored.customer_id, stored.arr, prior.arr
            ))),
        }
    }
}

/// The state committed by one ARR write.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrWriteOutcome {
    /// The customer as stored after the write.
    pub customer: Customer,
    /// The appended ledger row, `None` when the ARR did not change.
    pub movement: Option<RevenueMovement>,
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn get_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, DbError>;

    /// Every non-churned customer, optionally restricted to one segment.
    async fn list_live_customers(&self, segment: Option<SegmentTier>) -> Result<Vec<Customer>, DbError>;

    /// Mirrors a CRM record. The segment is re-derived from ARR; no movement is recorded.
    async fn upsert_customer(&self, customer: &Customer) -> Result<(), DbError>;

    /// Updates ARR, segment and lifecycle stage and appends the implied
    /// movement as one atomic unit. Fails with `NotFound` for an unknown
    /// customer and `Conflict` when `expected` no longer matches; in both
    /// cases nothing is written.
    async fn write_arr(&self, write: ArrWrite) -> Result<ArrWriteOutcome, DbError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn movements_for_customer(&self, customer_id: Uuid) -> Result<Vec<RevenueMovement>, DbError>;

    /// Movements dated in `[start, end)`, oldest first.
    async fn movements_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<RevenueMovement>, DbError>;
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Inserts or overwrites the snapshot for its period and returns the stored row.
    /// An overwritten period keeps its original snapshot id.
    async fn upsert_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<PortfolioSnapshot, DbError>;

    async fn get_snapshot(&self, period: NaiveDate) -> Result<Option<PortfolioSnapshot>, DbError>;

    /// Snapshots with `from <= period <= to`, oldest first.
    async fn list_snapshots(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<PortfolioSnapshot>, DbError>;
}

#[async_trait]
pub trait BenchmarkStore: Send + Sync {
    /// Replaces the entry for its key in a single write.
    async fn upsert_benchmark(&self, entry: &BenchmarkEntry) -> Result<(), DbError>;

    /// The stored entry regardless of expiry.
    async fn get_benchmark(&self, key: BenchmarkKey) -> Result<Option<BenchmarkEntry>, DbError>;
}

#[async_trait]
pub trait PercentileStore: Send + Sync {
    async fn append_percentile(&self, record: &CustomerPercentile) -> Result<(), DbError>;

    /// Most recent rows first.
    async fn percentile_history(
        &self,
        customer_id: Uuid,
        metric: Metric,
        limit: i64,
    ) -> Result<Vec<CustomerPercentile>, DbError>;
}

/// A backend that implements every store.
pub trait PortfolioStore: CustomerStore + LedgerStore + SnapshotStore + BenchmarkStore + PercentileStore {}

impl<T> PortfolioStore for T where T: CustomerStore + LedgerStore + SnapshotStore + BenchmarkStore + PercentileStore {}
