use benchmarks::BenchmarkError;
use database::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PercentileError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Metric '{0}' is not enabled for benchmarking")]
    InvalidMetric(String),

    #[error("Invalid percentile request: {0}")]
    InvalidInput(String),

    #[error("Benchmark refresh for {0} timed out")]
    Timeout(String),

    #[error("Benchmark unavailable: {0}")]
    Benchmark(BenchmarkError),

    #[error("Percentile storage failed: {0}")]
    Database(DbError),
}

impl From<BenchmarkError> for PercentileError {
    fn from(err: BenchmarkError) -> Self {
        match err {
            BenchmarkError::InvalidMetric(metric) => PercentileError::InvalidMetric(metric),
            BenchmarkError::Timeout(key) => PercentileError::Timeout(key),
            other => PercentileError::Benchmark(other),
        }
    }
}

impl From<DbError> for PercentileError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => PercentileError::NotFound(what),
            other => PercentileError::Database(other),
        }
    }
}
