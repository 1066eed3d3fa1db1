use crate::DbError;
use crate::store::{
    ArrWrite, ArrWriteOutcome, BenchmarkStore, CustomerStore, LedgerStore, PercentileStore, SnapshotStore,
};
use analytics::{ArrTransition, stage_after};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use core_types::{
    BenchmarkEntry, BenchmarkKey, Customer, CustomerPercentile, Metric, PortfolioSnapshot, RevenueMovement,
    SegmentTier, classify,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    customers: HashMap<Uuid, Customer>,
    movements: Vec<RevenueMovement>,
    snapshots: BTreeMap<NaiveDate, PortfolioSnapshot>,
    benchmarks: HashMap<BenchmarkKey, BenchmarkEntry>,
    percentiles: Vec<CustomerPercentile>,
}

/// A process-local store with the same contract as [`crate::DbRepository`].
///
/// Every write takes the single lock, so each trait method is atomic. Used by
/// tests and by `pulse serve --in-memory` for demos without PostgreSQL.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a customer directly, re-deriving its segment.
    pub async fn insert_customer(&self, mut customer: Customer) {
        customer.segment = classify(customer.arr);
        self.state.write().await.customers.insert(customer.customer_id, customer);
    }

    pub async fn movement_count(&self) -> usize {
        self.state.read().await.movements.len()
    }
}

#[async_trait]
impl CustomerStore for InMemoryStore {
    async fn get_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, DbError> {
        Ok(self.state.read().await.customers.get(&customer_id).cloned())
    }

    async fn list_live_customers(&self, segment: Option<SegmentTier>) -> Result<Vec<Customer>, DbError> {
        let state = self.state.read().await;
        let mut customers: Vec<Customer> = state
            .customers
            .values()
            .filter(|c| !c.is_churned())
            .filter(|c| segment.is_none_or(|s| c.segment == s))
            .cloned()
            .collect();
        customers.sort_by_key(|c| c.customer_id);
        Ok(customers)
    }

    async fn upsert_customer(&self, customer: &Customer) -> Result<(), DbError> {
        self.insert_customer(customer.clone()).await;
        Ok(())
    }

    async fn write_arr(&self, write: ArrWrite) -> Result<ArrWriteOutcome, DbError> {
        let mut state = self.state.write().await;
        let customer = state
            .customers
            .get(&write.customer_id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("customer {}", write.customer_id)))?;
        let previous_stage = write.prior_stage(&customer)?;

        let movement = ArrTransition {
            customer_id: customer.customer_id,
            previous_arr: Some(customer.arr),
            new_arr: write.new_arr,
            previous_stage,
            occurred_at: write.occurred_at,
            recorded_by: write.recorded_by,
            reason: write.reason,
        }
        .into_movement();

        let Some(movement) = movement else {
            return Ok(ArrWriteOutcome { customer, movement: None });
        };

        let mut updated = customer;
        updated.lifecycle_stage = stage_after(movement.movement_type, updated.lifecycle_stage);
        updated.set_arr(write.new_arr);
        updated.updated_at = Utc::now();

        state.customers.insert(updated.customer_id, updated.clone());
        state.movements.push(movement.clone());

        Ok(ArrWriteOutcome { customer: updated, movement: Some(movement) })
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn movements_for_customer(&self, customer_id: Uuid) -> Result<Vec<RevenueMovement>, DbError> {
        let state = self.state.read().await;
        let mut movements: Vec<RevenueMovement> =
            state.movements.iter().filter(|m| m.customer_id == customer_id).cloned().collect();
        movements.sort_by_key(|m| (m.movement_date, m.created_at));
        Ok(movements)
    }

    async fn movements_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<RevenueMovement>, DbError> {
        let state = self.state.read().await;
        let mut movements: Vec<RevenueMovement> = state
            .movements
            .iter()
            .filter(|m| m.movement_date >= start && m.movement_date < end)
            .cloned()
            .collect();
        movements.sort_by_key(|m| (m.movement_date, m.created_at));
        Ok(movements)
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn upsert_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<PortfolioSnapshot, DbError> {
        let mut state = self.state.write().await;
        let mut stored = snapshot.clone();
        if let Some(existing) = state.snapshots.get(&snapshot.period) {
            stored.snapshot_id = existing.snapshot_id;
        }
        state.snapshots.insert(stored.period, stored.clone());
        Ok(stored)
    }

    async fn get_snapshot(&self, period: NaiveDate) -> Result<Option<PortfolioSnapshot>, DbError> {
        Ok(self.state.read().await.snapshots.get(&period).cloned())
    }

    async fn list_snapshots(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<PortfolioSnapshot>, DbError> {
        if from > to {
            return Ok(Vec::new());
        }
        let state = self.state.read().await;
        Ok(state.snapshots.range(from..=to).map(|(_, s)| s.clone()).collect())
    }
}

#[async_trait]
impl BenchmarkStore for InMemoryStore {
    async fn upsert_benchmark(&self, entry: &BenchmarkEntry) -> Result<(), DbError> {
        self.state.write().await.benchmarks.insert(entry.key(), entry.clone());
        Ok(())
    }

    async fn get_benchmark(&self, key: BenchmarkKey) -> Result<Option<BenchmarkEntry>, DbError> {
        Ok(self.state.read().await.benchmarks.get(&key).cloned())
    }
}

#[async_trait]
impl PercentileStore for InMemoryStore {
    async fn append_percentile(&self, record: &CustomerPercentile) -> Result<(), DbError> {
        let mut state = self.state.write().await;
        if !state.customers.contains_key(&record.customer_id) {
            return Err(DbError::NotFound(format!("customer {}", record.customer_id)));
        }
        state.percentiles.push(record.clone());
        Ok(())
    }

    async fn percentile_history(
        &self,
        customer_id: Uuid,
        metric: Metric,
        limit: i64,
    ) -> Result<Vec<CustomerPercentile>, DbError> {
        let state = self.state.read().await;
        let mut rows: Vec<CustomerPercentile> = state
            .percentiles
            .iter()
            .filter(|p| p.customer_id == customer_id && p.metric == metric)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.calculated_at.cmp(&a.calculated_at));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }
}
