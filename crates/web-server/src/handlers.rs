use crate::{AppState, error::AppError};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use benchmarks::BenchmarkRead;
use chrono::{DateTime, Months, NaiveDate, Utc};
use core_types::{
    ArrChangeEvent, BenchmarkEntry, ComparisonScope, Customer, CustomerPercentile, Metric, PercentileResult,
    PortfolioSnapshot, RevenueMovement, SegmentTier,
};
use ledger::CRM_RECORDER;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const BENCHMARK_STATUS_HEADER: &str = "x-benchmark-status";

#[derive(Debug, Deserialize)]
pub struct SnapshotRange {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct SegmentFilter {
    segment: Option<SegmentTier>,
}

#[derive(Debug, Deserialize)]
pub struct ScopeFilter {
    #[serde(default)]
    scope: ComparisonScope,
}

#[derive(Debug, Deserialize)]
pub struct HistoryLimit {
    #[serde(default = "default_history_limit")]
    limit: i64,
}
fn default_history_limit() -> i64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct PeriodFilter {
    period: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ArrWriteRequest {
    pub new_arr: Decimal,
    pub occurred_at: Option<DateTime<Utc>>,
    pub recorded_by: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ArrWriteResponse {
    pub customer: Customer,
    pub movement: Option<RevenueMovement>,
}

/// # GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// # GET /api/snapshots?from=&to=
/// Defaults to the trailing twelve months.
pub async fn list_snapshots(
    State(state): State<Arc<AppState>>,
    Query(range): Query<SnapshotRange>,
) -> Result<Json<Vec<PortfolioSnapshot>>, AppError> {
    let to = range.to.unwrap_or_else(|| Utc::now().date_naive());
    let from = match range.from {
        Some(from) => from,
        None => to
            .checked_sub_months(Months::new(12))
            .ok_or_else(|| AppError::InvalidInput(format!("no default range ends at {to}")))?,
    };
    let snapshots = state.snapshots.list(from, to).await?;
    Ok(Json(snapshots))
}

/// # GET /api/snapshots/:period
pub async fn get_snapshot(
    Path(period): Path<NaiveDate>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PortfolioSnapshot>, AppError> {
    let snapshot = state.snapshots.get(period).await?;
    Ok(Json(snapshot))
}

/// # POST /api/snapshots/:period/generate
pub async fn generate_snapshot(
    Path(period): Path<NaiveDate>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PortfolioSnapshot>, AppError> {
    let snapshot = state.snapshots.generate(period).await?;
    Ok(Json(snapshot))
}

/// # GET /api/benchmarks/:metric?segment=
/// The `x-benchmark-status` header says whether the entry was cached,
/// refreshed for this request, or served stale after a failed refresh.
pub async fn get_benchmark(
    Path(metric): Path<String>,
    Query(filter): Query<SegmentFilter>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let metric: Metric = metric.parse()?;
    let read = state.benchmarks.get_or_refresh(metric, filter.segment).await?;
    let status = match &read {
        BenchmarkRead::Hit(_) => "hit",
        BenchmarkRead::Refreshed(_) => "refreshed",
        BenchmarkRead::Stale(_) => "stale",
    };
    let entry: BenchmarkEntry = read.into_entry().as_ref().clone();
    Ok(([(BENCHMARK_STATUS_HEADER, status)], Json(entry)))
}

/// # POST /api/benchmarks/:metric/refresh?segment=
pub async fn refresh_benchmark(
    Path(metric): Path<String>,
    Query(filter): Query<SegmentFilter>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<BenchmarkEntry>, AppError> {
    let metric: Metric = metric.parse()?;
    let entry = state.benchmarks.refresh(metric, filter.segment).await?;
    Ok(Json(entry.as_ref().clone()))
}

/// # GET /api/customers/:customer_id/percentiles/:metric?scope=
pub async fn get_percentile(
    Path((customer_id, metric)): Path<(Uuid, String)>,
    Query(filter): Query<ScopeFilter>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PercentileResult>, AppError> {
    let metric: Metric = metric.parse()?;
    let result = state.percentiles.percentile(customer_id, metric, filter.scope).await?;
    Ok(Json(result))
}

/// # GET /api/customers/:customer_id/percentiles/:metric/history?limit=
pub async fn percentile_history(
    Path((customer_id, metric)): Path<(Uuid, String)>,
    Query(limit): Query<HistoryLimit>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CustomerPercentile>>, AppError> {
    let metric: Metric = metric.parse()?;
    let rows = state.percentiles.history(customer_id, metric, limit.limit).await?;
    Ok(Json(rows))
}

/// # GET /api/customers/:customer_id/movements
pub async fn customer_movements(
    Path(customer_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RevenueMovement>>, AppError> {
    let movements = state.recorder.movements_for_customer(customer_id).await?;
    Ok(Json(movements))
}

/// # GET /api/movements?period=
pub async fn period_movements(
    Query(filter): Query<PeriodFilter>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RevenueMovement>>, AppError> {
    let movements = state.recorder.movements_in_period(filter.period).await?;
    Ok(Json(movements))
}

/// # PUT /api/customers/:customer_id/arr
/// The write-path hook: updates ARR and records the movement in one unit.
pub async fn write_arr(
    Path(customer_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<ArrWriteRequest>,
) -> Result<Json<ArrWriteResponse>, AppError> {
    let recorded_by = request.recorded_by.as_deref().unwrap_or("api");
    let written = state
        .recorder
        .write_arr(
            customer_id,
            request.new_arr,
            request.occurred_at.unwrap_or_else(Utc::now),
            recorded_by,
            request.reason,
        )
        .await?;
    Ok(Json(ArrWriteResponse { customer: written.customer, movement: written.movement }))
}

/// # POST /api/arr-events
/// An ARR change the CRM has already committed. 201 with the movement when
/// one was recorded, 200 with `null` for a no-op.
pub async fn arr_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<ArrChangeEvent>,
) -> Result<(StatusCode, Json<Option<RevenueMovement>>), AppError> {
    let movement = state.recorder.record_if_changed(event, CRM_RECORDER).await?;
    let status = if movement.is_some() { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(movement)))
}
