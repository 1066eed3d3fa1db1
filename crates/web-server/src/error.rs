use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use benchmarks::BenchmarkError;
use core_types::CoreError;
use ledger::LedgerError;
use percentiles::PercentileError;
use serde_json::json;
use snapshots::SnapshotError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Metric '{0}' is not enabled for benchmarking")]
    InvalidMetric(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Ledger error: {0}")]
    Ledger(LedgerError),
    #[error("Snapshot error: {0}")]
    Snapshot(SnapshotError),
    #[error("Benchmark error: {0}")]
    Benchmark(BenchmarkError),
    #[error("Percentile error: {0}")]
    Percentile(PercentileError),
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidMetric(metric) => AppError::InvalidMetric(metric),
            other => AppError::InvalidInput(other.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(what) => AppError::NotFound(what),
            LedgerError::InvalidInput(msg) => AppError::InvalidInput(msg),
            LedgerError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::Ledger(other),
        }
    }
}

impl From<SnapshotError> for AppError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::NotFound(period) => AppError::NotFound(format!("snapshot for {period}")),
            SnapshotError::InvalidPeriod(e) => AppError::InvalidInput(e.to_string()),
            other => AppError::Snapshot(other),
        }
    }
}

impl From<BenchmarkError> for AppError {
    fn from(err: BenchmarkError) -> Self {
        match err {
            BenchmarkError::InvalidMetric(metric) => AppError::InvalidMetric(metric),
            BenchmarkError::Timeout(key) => AppError::Timeout(format!("benchmark refresh for {key}")),
            other => AppError::Benchmark(other),
        }
    }
}

impl From<PercentileError> for AppError {
    fn from(err: PercentileError) -> Self {
        match err {
            PercentileError::NotFound(what) => AppError::NotFound(what),
            PercentileError::InvalidMetric(metric) => AppError::InvalidMetric(metric),
            PercentileError::InvalidInput(msg) => AppError::InvalidInput(msg),
            PercentileError::Timeout(key) => AppError::Timeout(format!("benchmark refresh for {key}")),
            other => AppError::Percentile(other),
        }
    }
}

/// Converts our custom `AppError` into an HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::InvalidMetric(metric) => {
                (StatusCode::BAD_REQUEST, format!("metric '{metric}' is not enabled for benchmarking"))
            }
            AppError::InvalidInput(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Conflict(message) => (StatusCode::CONFLICT, message),
            AppError::Timeout(what) => (StatusCode::GATEWAY_TIMEOUT, format!("{what} timed out")),
            internal => {
                tracing::error!(error = ?internal, "Request failed.");
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred".to_string())
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
