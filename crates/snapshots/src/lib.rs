//! # Pulse Snapshots
//!
//! The Snapshot Generator: one `PortfolioSnapshot` per month, recomputed and
//! overwritten on every run.
//!
//! A snapshot for period `P` holds the live portfolio totals at generation
//! time and the movements dated in `[P - 1 month, P)`. The prior ARR base is
//! the stored total of the previous period's snapshot when one exists and is
//! otherwise reconstructed from the current total and the period's movements.

use analytics::{MovementTotals, PortfolioTotals, RetentionMetrics};
use chrono::{NaiveDate, Utc};
use core_types::PortfolioSnapshot;
use core_types::period::{period_start, previous_period_start};
use database::{CustomerStore, LedgerStore, SnapshotStore};
use std::sync::Arc;
use uuid::Uuid;

pub mod error;

pub use error::SnapshotError;

pub struct SnapshotGenerator {
    customers: Arc<dyn CustomerStore>,
    ledger: Arc<dyn LedgerStore>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl SnapshotGenerator {
    pub fn new(
        customers: Arc<dyn CustomerStore>,
        ledger: Arc<dyn LedgerStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self { customers, ledger, snapshots }
    }

    /// Computes and stores the snapshot for the month containing `period`.
    ///
    /// Idempotent: a second run for the same month overwrites the first and
    /// keeps its id. An empty portfolio yields zero totals and 100% retention.
    pub async fn generate(&self, period: NaiveDate) -> Result<PortfolioSnapshot, SnapshotError> {
        let period = period_start(period);
        let previous = previous_period_start(period)?;

        let customers = self.customers.list_live_customers(None).await?;
        let portfolio = PortfolioTotals::from_customers(&customers);

        let movements = self.ledger.movements_between(previous, period).await?;
        let totals = MovementTotals::from_movements(&movements);

        let prior_arr = match self.snapshots.get_snapshot(previous).await? {
            Some(prior) => prior.total_arr,
            None => totals.back_computed_prior_arr(portfolio.total_arr),
        };
        let retention = RetentionMetrics::compute(prior_arr, &totals);

        let snapshot = PortfolioSnapshot {
            snapshot_id: Uuid::new_v4(),
            period,
            total_arr: portfolio.total_arr,
            customer_count: portfolio.customer_count,
            new_arr: totals.new,
            reactivation_arr: totals.reactivation,
            expansion_arr: totals.expansion,
            contraction_arr: totals.contraction,
            churn_arr: totals.churn,
            grr: retention.grr,
            nrr: retention.nrr,
            segment_breakdown: portfolio.segment_breakdown,
            generated_at: Utc::now(),
        };

        let stored = self.snapshots.upsert_snapshot(&snapshot).await?;
        tracing::info!(
            period = %stored.period,
            total_arr = %stored.total_arr,
            customers = stored.customer_count,
            movements = movements.len(),
            grr = %stored.grr,
            nrr = %stored.nrr,
            "Portfolio snapshot generated."
        );
        Ok(stored)
    }

    /// The stored snapshot for the month containing `period`.
    pub async fn get(&self, period: NaiveDate) -> Result<PortfolioSnapshot, SnapshotError> {
        let period = period_start(period);
        self.snapshots
            .get_snapshot(period)
            .await?
            .ok_or_else(|| SnapshotError::NotFound(period.to_string()))
    }

    /// Stored snapshots whose period falls between the months of `from` and `to`, inclusive.
    pub async fn list(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<PortfolioSnapshot>, SnapshotError> {
        let (from, to) = (period_start(from), period_start(to));
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self.snapshots.list_snapshots(from, to).await?)
    }
}
