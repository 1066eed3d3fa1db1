use analytics::AnalyticsError;
use database::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error("Metric '{0}' is not enabled for benchmarking")]
    InvalidMetric(String),

    #[error("Benchmark refresh for {0} timed out")]
    Timeout(String),

    #[error("Benchmark storage failed: {0}")]
    Database(#[from] DbError),

    #[error("Benchmark calculation failed: {0}")]
    Analytics(#[from] AnalyticsError),
}
