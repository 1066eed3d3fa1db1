use crate::DbError;
use crate::store::{
    ArrWrite, ArrWriteOutcome, BenchmarkStore, CustomerStore, LedgerStore, PercentileStore, SnapshotStore,
};
use analytics::{ArrTransition, stage_after};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use core_types::{
    BenchmarkEntry, BenchmarkKey, BenchmarkSample, Customer, CustomerPercentile, DistributionStats, Metric, Performer,
    PortfolioSnapshot, RevenueMovement, SegmentStats, SegmentTier, classify,
};
use sqlx::postgres::{PgPool, PgRow, Postgres};
use sqlx::types::Json;
use sqlx::{Executor, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

const CUSTOMER_COLUMNS: &str =
    "customer_id, name, arr, segment, lifecycle_stage, health_score, nps_score, usage_score, updated_at";

const MOVEMENT_COLUMNS: &str =
    "movement_id, customer_id, movement_date, movement_type, previous_arr, new_arr, reason, recorded_by, created_at";

const SNAPSHOT_COLUMNS: &str = "snapshot_id, period, total_arr, customer_count, new_arr, reactivation_arr, \
     expansion_arr, contraction_arr, churn_arr, grr, nrr, segment_breakdown, generated_at";

const BENCHMARK_COLUMNS: &str = "metric, segment, min_value, p25_value, median_value, p75_value, max_value, \
     mean_value, sample_size, top_performers, bottom_performers, distribution, calculated_at, expires_at";

const PERCENTILE_COLUMNS: &str = "percentile_id, customer_id, metric, value, percentile, benchmark_median, scope, \
     segment, sample_size, calculated_at";

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn customer_from_row(row: &PgRow) -> Result<Customer, DbError> {
    Ok(Customer {
        customer_id: row.try_get("customer_id")?,
        name: row.try_get("name")?,
        arr: row.try_get("arr")?,
        segment: row.try_get::<String, _>("segment")?.parse()?,
        lifecycle_stage: row.try_get::<String, _>("lifecycle_stage")?.parse()?,
        health_score: row.try_get("health_score")?,
        nps_score: row.try_get("nps_score")?,
        usage_score: row.try_get("usage_score")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn movement_from_row(row: &PgRow) -> Result<RevenueMovement, DbError> {
    Ok(RevenueMovement {
        movement_id: row.try_get("movement_id")?,
        customer_id: row.try_get("customer_id")?,
        movement_date: row.try_get("movement_date")?,
        movement_type: row.try_get::<String, _>("movement_type")?.parse()?,
        previous_arr: row.try_get("previous_arr")?,
        new_arr: row.try_get("new_arr")?,
        reason: row.try_get("reason")?,
        recorded_by: row.try_get("recorded_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn snapshot_from_row(row: &PgRow) -> Result<PortfolioSnapshot, DbError> {
    let breakdown: Json<BTreeMap<SegmentTier, SegmentStats>> = row.try_get("segment_breakdown")?;
    Ok(PortfolioSnapshot {
        snapshot_id: row.try_get("snapshot_id")?,
        period: row.try_get("period")?,
        total_arr: row.try_get("total_arr")?,
        customer_count: row.try_get("customer_count")?,
        new_arr: row.try_get("new_arr")?,
        reactivation_arr: row.try_get("reactivation_arr")?,
        expansion_arr: row.try_get("expansion_arr")?,
        contraction_arr: row.try_get("contraction_arr")?,
        churn_arr: row.try_get("churn_arr")?,
        grr: row.try_get("grr")?,
        nrr: row.try_get("nrr")?,
        segment_breakdown: breakdown.0,
        generated_at: row.try_get("generated_at")?,
    })
}

fn benchmark_from_row(row: &PgRow) -> Result<BenchmarkEntry, DbError> {
    let top: Json<Vec<Performer>> = row.try_get("top_performers")?;
    let bottom: Json<Vec<Performer>> = row.try_get("bottom_performers")?;
    let distribution: Json<Vec<BenchmarkSample>> = row.try_get("distribution")?;
    Ok(BenchmarkEntry {
        metric: row.try_get::<String, _>("metric")?.parse()?,
        segment: parse_segment(row.try_get("segment")?)?,
        stats: DistributionStats {
            min: row.try_get("min_value")?,
            p25: row.try_get("p25_value")?,
            median: row.try_get("median_value")?,
            p75: row.try_get("p75_value")?,
            max: row.try_get("max_value")?,
            mean: row.try_get("mean_value")?,
            sample_size: row.try_get("sample_size")?,
        },
        top_performers: top.0,
        bottom_performers: bottom.0,
        distribution: distribution.0,
        calculated_at: row.try_get("calculated_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn percentile_from_row(row: &PgRow) -> Result<CustomerPercentile, DbError> {
    Ok(CustomerPercentile {
        percentile_id: row.try_get("percentile_id")?,
        customer_id: row.try_get("customer_id")?,
        metric: row.try_get::<String, _>("metric")?.parse()?,
        value: row.try_get("value")?,
        percentile: row.try_get("percentile")?,
        benchmark_median: row.try_get("benchmark_median")?,
        scope: row.try_get::<String, _>("scope")?.parse()?,
        segment: parse_segment(row.try_get("segment")?)?,
        sample_size: row.try_get("sample_size")?,
        calculated_at: row.try_get("calculated_at")?,
    })
}

fn parse_segment(raw: Option<String>) -> Result<Option<SegmentTier>, DbError> {
    Ok(raw.map(|s| s.parse()).transpose()?)
}

/// A foreign-key violation on `customer_id` means the customer does not exist.
fn customer_missing_or(err: sqlx::Error, customer_id: Uuid) -> DbError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_foreign_key_violation() {
            return DbError::NotFound(format!("customer {customer_id}"));
        }
    }
    DbError::from(err)
}

async fn insert_movement<'e, E>(executor: E, movement: &RevenueMovement) -> Result<(), DbError>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO revenue_movements
            (movement_id, customer_id, movement_date, movement_type, previous_arr, new_arr, source, reason, recorded_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(movement.movement_id)
    .bind(movement.customer_id)
    .bind(movement.movement_date)
    .bind(movement.movement_type.as_str())
    .bind(movement.previous_arr)
    .bind(movement.new_arr)
    .bind(movement.source().as_str())
    .bind(movement.reason.as_deref())
    .bind(&movement.recorded_by)
    .bind(movement.created_at)
    .execute(executor)
    .await
    .map_err(|e| customer_missing_or(e, movement.customer_id))?;
    Ok(())
}

#[async_trait]
impl CustomerStore for DbRepository {
    async fn get_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, DbError> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE customer_id = $1");
        let row = sqlx::query(&sql).bind(customer_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn list_live_customers(&self, segment: Option<SegmentTier>) -> Result<Vec<Customer>, DbError> {
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers \
             WHERE lifecycle_stage <> 'churned' AND ($1::text IS NULL OR segment = $1) \
             ORDER BY customer_id"
        );
        let rows = sqlx::query(&sql)
            .bind(segment.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(customer_from_row).collect()
    }

    async fn upsert_customer(&self, customer: &Customer) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO customers
                (customer_id, name, arr, segment, lifecycle_stage, health_score, nps_score, usage_score, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (customer_id) DO UPDATE SET
                name = EXCLUDED.name,
                arr = EXCLUDED.arr,
                segment = EXCLUDED.segment,
                lifecycle_stage = EXCLUDED.lifecycle_stage,
                health_score = EXCLUDED.health_score,
                nps_score = EXCLUDED.nps_score,
                usage_score = EXCLUDED.usage_score,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(customer.customer_id)
        .bind(&customer.name)
        .bind(customer.arr)
        .bind(classify(customer.arr).as_str())
        .bind(customer.lifecycle_stage.as_str())
        .bind(customer.health_score)
        .bind(customer.nps_score)
        .bind(customer.usage_score)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn write_arr(&self, write: ArrWrite) -> Result<ArrWriteOutcome, DbError> {
        let mut tx = self.pool.begin().await?;

        // Lock the row so the stage we classify against is the one right before this write.
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE customer_id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(write.customer_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("customer {}", write.customer_id)))?;
        let mut customer = customer_from_row(&row)?;
        // Dropping the transaction on a conflict rolls it back.
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
            tx.rollback().await?;
            return Ok(ArrWriteOutcome { customer, movement: None });
        };

        customer.lifecycle_stage = stage_after(movement.movement_type, customer.lifecycle_stage);
        customer.set_arr(write.new_arr);
        customer.updated_at = Utc::now();

        sqlx::query(
            "UPDATE customers SET arr = $2, segment = $3, lifecycle_stage = $4, updated_at = $5 WHERE customer_id = $1",
        )
        .bind(customer.customer_id)
        .bind(customer.arr)
        .bind(customer.segment.as_str())
        .bind(customer.lifecycle_stage.as_str())
        .bind(customer.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_movement(&mut *tx, &movement).await?;
        tx.commit().await?;

        Ok(ArrWriteOutcome { customer, movement: Some(movement) })
    }
}

#[async_trait]
impl LedgerStore for DbRepository {
    async fn movements_for_customer(&self, customer_id: Uuid) -> Result<Vec<RevenueMovement>, DbError> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM revenue_movements WHERE customer_id = $1 ORDER BY movement_date, created_at"
        );
        let rows = sqlx::query(&sql).bind(customer_id).fetch_all(&self.pool).await?;
        rows.iter().map(movement_from_row).collect()
    }

    async fn movements_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<RevenueMovement>, DbError> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM revenue_movements \
             WHERE movement_date >= $1 AND movement_date < $2 \
             ORDER BY movement_date, created_at"
        );
        let rows = sqlx::query(&sql).bind(start).bind(end).fetch_all(&self.pool).await?;
        rows.iter().map(movement_from_row).collect()
    }
}

#[async_trait]
impl SnapshotStore for DbRepository {
    async fn upsert_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<PortfolioSnapshot, DbError> {
        let row = sqlx::query(
            r#"
            INSERT INTO portfolio_snapshots
                (snapshot_id, period, total_arr, customer_count, new_arr, reactivation_arr, expansion_arr,
                 contraction_arr, churn_arr, grr, nrr, segment_breakdown, generated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (period) DO UPDATE SET
                total_arr = EXCLUDED.total_arr,
                customer_count = EXCLUDED.customer_count,
                new_arr = EXCLUDED.new_arr,
                reactivation_arr = EXCLUDED.reactivation_arr,
                expansion_arr = EXCLUDED.expansion_arr,
                contraction_arr = EXCLUDED.contraction_arr,
                churn_arr = EXCLUDED.churn_arr,
                grr = EXCLUDED.grr,
                nrr = EXCLUDED.nrr,
                segment_breakdown = EXCLUDED.segment_breakdown,
                generated_at = EXCLUDED.generated_at
            RETURNING snapshot_id
            "#,
        )
        .bind(snapshot.snapshot_id)
        .bind(snapshot.period)
        .bind(snapshot.total_arr)
        .bind(snapshot.customer_count)
        .bind(snapshot.new_arr)
        .bind(snapshot.reactivation_arr)
        .bind(snapshot.expansion_arr)
        .bind(snapshot.contraction_arr)
        .bind(snapshot.churn_arr)
        .bind(snapshot.grr)
        .bind(snapshot.nrr)
        .bind(Json(&snapshot.segment_breakdown))
        .bind(snapshot.generated_at)
        .fetch_one(&self.pool)
        .await?;

        let mut stored = snapshot.clone();
        stored.snapshot_id = row.try_get("snapshot_id")?;
        Ok(stored)
    }

    async fn get_snapshot(&self, period: NaiveDate) -> Result<Option<PortfolioSnapshot>, DbError> {
        let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM portfolio_snapshots WHERE period = $1");
        let row = sqlx::query(&sql).bind(period).fetch_optional(&self.pool).await?;
        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn list_snapshots(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<PortfolioSnapshot>, DbError> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM portfolio_snapshots WHERE period >= $1 AND period <= $2 ORDER BY period"
        );
        let rows = sqlx::query(&sql).bind(from).bind(to).fetch_all(&self.pool).await?;
        rows.iter().map(snapshot_from_row).collect()
    }
}

#[async_trait]
impl BenchmarkStore for DbRepository {
    async fn upsert_benchmark(&self, entry: &BenchmarkEntry) -> Result<(), DbError> {
        // One statement, so readers see either the old row or the new one.
        sqlx::query(
            r#"
            INSERT INTO benchmarks
                (metric, segment, min_value, p25_value, median_value, p75_value, max_value, mean_value,
                 sample_size, top_performers, bottom_performers, distribution, calculated_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT ON CONSTRAINT benchmarks_metric_segment_key DO UPDATE SET
                min_value = EXCLUDED.min_value,
                p25_value = EXCLUDED.p25_value,
                median_value = EXCLUDED.median_value,
                p75_value = EXCLUDED.p75_value,
                max_value = EXCLUDED.max_value,
                mean_value = EXCLUDED.mean_value,
                sample_size = EXCLUDED.sample_size,
                top_performers = EXCLUDED.top_performers,
                bottom_performers = EXCLUDED.bottom_performers,
                distribution = EXCLUDED.distribution,
                calculated_at = EXCLUDED.calculated_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(entry.metric.as_str())
        .bind(entry.segment.map(|s| s.as_str()))
        .bind(entry.stats.min)
        .bind(entry.stats.p25)
        .bind(entry.stats.median)
        .bind(entry.stats.p75)
        .bind(entry.stats.max)
        .bind(entry.stats.mean)
        .bind(entry.stats.sample_size)
        .bind(Json(&entry.top_performers))
        .bind(Json(&entry.bottom_performers))
        .bind(Json(&entry.distribution))
        .bind(entry.calculated_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_benchmark(&self, key: BenchmarkKey) -> Result<Option<BenchmarkEntry>, DbError> {
        let sql = format!(
            "SELECT {BENCHMARK_COLUMNS} FROM benchmarks WHERE metric = $1 AND segment IS NOT DISTINCT FROM $2"
        );
        let row = sqlx::query(&sql)
            .bind(key.metric.as_str())
            .bind(key.segment.map(|s| s.as_str()))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(benchmark_from_row).transpose()
    }
}

#[async_trait]
impl PercentileStore for DbRepository {
    async fn append_percentile(&self, record: &CustomerPercentile) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO customer_percentiles
                (percentile_id, customer_id, metric, value, percentile, benchmark_median, scope, segment, sample_size, calculated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.percentile_id)
        .bind(record.customer_id)
        .bind(record.metric.as_str())
        .bind(record.value)
        .bind(record.percentile)
        .bind(record.benchmark_median)
        .bind(record.scope.as_str())
        .bind(record.segment.map(|s| s.as_str()))
        .bind(record.sample_size)
        .bind(record.calculated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| customer_missing_or(e, record.customer_id))?;
        Ok(())
    }

    async fn percentile_history(
        &self,
        customer_id: Uuid,
        metric: Metric,
        limit: i64,
    ) -> Result<Vec<CustomerPercentile>, DbError> {
        let sql = format!(
            "SELECT {PERCENTILE_COLUMNS} FROM customer_percentiles \
             WHERE customer_id = $1 AND metric = $2 \
             ORDER BY calculated_at DESC LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(customer_id)
            .bind(metric.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(percentile_from_row).collect()
    }
}

/// These run against the database named by `DATABASE_URL` and return early
/// when it is unset. Rows are keyed by fresh ids so reruns do not collide.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{connect, run_migrations};
    use crate::store::PriorState;
    use chrono::{DateTime, TimeDelta, TimeZone};
    use configuration::DatabaseSettings;
    use core_types::{ComparisonScope, LifecycleStage, MovementType};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    async fn test_repository() -> Option<DbRepository> {
        dotenvy::dotenv().ok();
        if std::env::var("DATABASE_URL").is_err() {
            eprintln!("DATABASE_URL is not set; skipping PostgreSQL test.");
            return None;
        }
        let pool = connect(&DatabaseSettings::default()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        Some(DbRepository::new(pool))
    }

    async fn seeded(repo: &DbRepository, arr: Decimal, stage: LifecycleStage) -> Uuid {
        let id = Uuid::new_v4();
        repo.upsert_customer(&Customer::new(id, "Acme", arr, stage)).await.unwrap();
        id
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
    }

    fn write(customer_id: Uuid, new_arr: Decimal) -> ArrWrite {
        ArrWrite {
            customer_id,
            new_arr,
            occurred_at: at(10),
            recorded_by: "test".to_string(),
            reason: Some("upsell".to_string()),
            expected: None,
        }
    }

    #[tokio::test]
    async fn write_arr_commits_customer_and_movement_together() {
        let Some(repo) = test_repository().await else { return };
        let id = seeded(&repo, dec!(50000), LifecycleStage::Active).await;

        let outcome = repo.write_arr(write(id, dec!(120000.50))).await.unwrap();
        let movement = outcome.movement.unwrap();
        assert_eq!(movement.movement_type, MovementType::Expansion);
        assert_eq!(outcome.customer.segment, SegmentTier::Enterprise);

        let stored = repo.get_customer(id).await.unwrap().unwrap();
        assert_eq!(stored.arr, dec!(120000.50));
        assert_eq!(stored.segment, SegmentTier::Enterprise);
        let ledger = repo.movements_for_customer(id).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].change_amount(), dec!(70000.50));
        assert_eq!(ledger[0].reason.as_deref(), Some("upsell"));

        // Same value: rolled back, nothing appended.
        let repeat = repo.write_arr(write(id, dec!(120000.50))).await.unwrap();
        assert!(repeat.movement.is_none());
        assert_eq!(repo.movements_for_customer(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn write_arr_churn_leaves_the_live_set() {
        let Some(repo) = test_repository().await else { return };
        let id = seeded(&repo, dec!(30000), LifecycleStage::Active).await;

        let outcome = repo.write_arr(write(id, Decimal::ZERO)).await.unwrap();

        assert_eq!(outcome.movement.unwrap().movement_type, MovementType::Churn);
        assert_eq!(repo.get_customer(id).await.unwrap().unwrap().lifecycle_stage, LifecycleStage::Churned);
        let live = repo.list_live_customers(None).await.unwrap();
        assert!(live.iter().all(|c| c.customer_id != id));
    }

    #[tokio::test]
    async fn guarded_write_conflict_rolls_back() {
        let Some(repo) = test_repository().await else { return };
        let id = seeded(&repo, dec!(70000), LifecycleStage::Active).await;
        let mut stale = write(id, dec!(90000));
        stale.expected = Some(PriorState { arr: dec!(60000), stage: LifecycleStage::Active });

        let result = repo.write_arr(stale).await;

        assert!(matches!(result, Err(DbError::Conflict(_))));
        assert_eq!(repo.get_customer(id).await.unwrap().unwrap().arr, dec!(70000));
        assert!(repo.movements_for_customer(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_customer_is_not_found() {
        let Some(repo) = test_repository().await else { return };
        let stranger = Uuid::new_v4();

        let written = repo.write_arr(write(stranger, dec!(10))).await;
        assert!(matches!(written, Err(DbError::NotFound(_))));

        // The percentile history insert hits the foreign key instead.
        let record = CustomerPercentile {
            percentile_id: Uuid::new_v4(),
            customer_id: stranger,
            metric: Metric::Arr,
            value: dec!(10),
            percentile: 50,
            benchmark_median: dec!(10),
            scope: ComparisonScope::Portfolio,
            segment: None,
            sample_size: 0,
            calculated_at: Utc::now(),
        };
        assert!(matches!(repo.append_percentile(&record).await, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn portfolio_benchmark_upsert_replaces_the_null_segment_row() {
        let Some(repo) = test_repository().await else { return };
        let distribution = vec![
            BenchmarkSample { customer_id: Uuid::new_v4(), value: dec!(10) },
            BenchmarkSample { customer_id: Uuid::new_v4(), value: dec!(20) },
            BenchmarkSample { customer_id: Uuid::new_v4(), value: dec!(30) },
        ];
        let now = Utc::now();
        let mut entry = BenchmarkEntry {
            metric: Metric::UsageScore,
            segment: None,
            stats: DistributionStats {
                min: dec!(10),
                p25: dec!(15),
                median: dec!(20),
                p75: dec!(25),
                max: dec!(30),
                mean: dec!(20),
                sample_size: 3,
            },
            top_performers: vec![Performer {
                customer_id: distribution[2].customer_id,
                name: "Top".to_string(),
                value: dec!(30),
                segment: SegmentTier::Smb,
            }],
            bottom_performers: Vec::new(),
            distribution: distribution.clone(),
            calculated_at: now,
            expires_at: now + TimeDelta::hours(24),
        };
        repo.upsert_benchmark(&entry).await.unwrap();

        entry.stats.median = dec!(22);
        repo.upsert_benchmark(&entry).await.unwrap();

        let stored = repo.get_benchmark(BenchmarkKey::new(Metric::UsageScore, None)).await.unwrap().unwrap();
        assert_eq!(stored.segment, None);
        assert_eq!(stored.stats.median, dec!(22));
        assert_eq!(stored.stats.sample_size, 3);
        assert_eq!(stored.top_performers.len(), 1);
        assert_eq!(stored.top_performers[0].customer_id, distribution[2].customer_id);
        let values: Vec<(Uuid, Decimal)> = stored.distribution.iter().map(|s| (s.customer_id, s.value)).collect();
        let expected: Vec<(Uuid, Decimal)> = distribution.iter().map(|s| (s.customer_id, s.value)).collect();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn snapshot_upsert_keeps_original_id() {
        let Some(repo) = test_repository().await else { return };
        let period = NaiveDate::from_ymd_opt(2199, 1, 1).unwrap();
        let snapshot = PortfolioSnapshot {
            snapshot_id: Uuid::new_v4(),
            period,
            total_arr: dec!(100),
            customer_count: 1,
            new_arr: Decimal::ZERO,
            reactivation_arr: Decimal::ZERO,
            expansion_arr: Decimal::ZERO,
            contraction_arr: Decimal::ZERO,
            churn_arr: Decimal::ZERO,
            grr: dec!(100),
            nrr: dec!(100),
            segment_breakdown: BTreeMap::from([(
                SegmentTier::Smb,
                SegmentStats { arr: dec!(100), customer_count: 1, avg_arr: dec!(100) },
            )]),
            generated_at: Utc::now(),
        };
        let first = repo.upsert_snapshot(&snapshot).await.unwrap();

        let mut again = snapshot.clone();
        again.snapshot_id = Uuid::new_v4();
        again.total_arr = dec!(200);
        let second = repo.upsert_snapshot(&again).await.unwrap();

        assert_eq!(second.snapshot_id, first.snapshot_id);
        let listed = repo.list_snapshots(period, period).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].total_arr, dec!(200));
        assert_eq!(listed[0].segment_breakdown[&SegmentTier::Smb].customer_count, 1);
    }
}
