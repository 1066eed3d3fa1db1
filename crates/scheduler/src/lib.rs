//! # Pulse Scheduler
//!
//! Background jobs for the analytics core. Each tick it makes sure the
//! current month has a snapshot (regenerating it when the schedule says it is
//! too old) and refreshes every expired benchmark. A failed job is logged and
//! simply attempted again on the next tick.

use benchmarks::BenchmarkCache;
use chrono::{DateTime, NaiveDate, Utc};
use configuration::SnapshotSchedule;
use core_types::PortfolioSnapshot;
use core_types::period::period_start;
use snapshots::{SnapshotError, SnapshotGenerator};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// What one scheduler pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub snapshot_generated: bool,
    pub snapshot_failed: bool,
    pub benchmarks_refreshed: usize,
    pub benchmarks_failed: usize,
}

pub struct Scheduler {
    snapshots: Arc<SnapshotGenerator>,
    benchmarks: Arc<BenchmarkCache>,
    schedule: SnapshotSchedule,
    tick: Duration,
}

impl Scheduler {
    pub fn new(
        snapshots: Arc<SnapshotGenerator>,
        benchmarks: Arc<BenchmarkCache>,
        schedule: SnapshotSchedule,
        tick: Duration,
    ) -> Self {
        Self { snapshots, benchmarks, schedule, tick }
    }

    /// Runs passes every `tick` until `shutdown` resolves. The first pass runs immediately.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        tracing::info!(tick = ?self.tick, schedule = ?self.schedule, "Scheduler started.");
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Scheduler stopping.");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.run_once(Utc::now()).await;
                    tracing::debug!(?report, "Scheduler pass finished.");
                }
            }
        }
    }

    /// One pass of every job.
    pub async fn run_once(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        let period = period_start(now.date_naive());
        match self.snapshot_due(period, now).await {
            Ok(true) => match self.snapshots.generate(period).await {
                Ok(_) => report.snapshot_generated = true,
                Err(err) => {
                    report.snapshot_failed = true;
                    tracing::error!(period = %period, error = %err, "Scheduled snapshot failed; will retry next tick.");
                }
            },
            Ok(false) => {}
            Err(err) => {
                report.snapshot_failed = true;
                tracing::error!(period = %period, error = %err, "Could not check snapshot state; will retry next tick.");
            }
        }

        for (key, outcome) in self.benchmarks.refresh_expired().await {
            match outcome {
                Ok(_) => report.benchmarks_refreshed += 1,
                Err(err) => {
                    report.benchmarks_failed += 1;
                    tracing::error!(key = %key, error = %err, "Scheduled benchmark refresh failed; will retry next tick.");
                }
            }
        }

        report
    }

    async fn snapshot_due(&self, period: NaiveDate, now: DateTime<Utc>) -> Result<bool, SnapshotError> {
        match self.snapshots.get(period).await {
            Ok(existing) => Ok(is_stale(&existing, self.schedule, now)),
            Err(SnapshotError::NotFound(_)) => Ok(true),
            Err(err) => Err(err),
        }
    }
}

/// Whether an existing snapshot of the current period should be recomputed.
pub fn is_stale(snapshot: &PortfolioSnapshot, schedule: SnapshotSchedule, now: DateTime<Utc>) -> bool {
    match schedule.regenerate_after() {
        Some(max_age) => now - snapshot.generated_at >= max_age,
        None => false,
    }
}
