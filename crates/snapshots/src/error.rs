use core_types::CoreError;
use database::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("No snapshot for period {0}")]
    NotFound(String),

    #[error("Invalid snapshot period: {0}")]
    InvalidPeriod(#[from] CoreError),

    #[error("Snapshot storage failed: {0}")]
    Database(#[from] DbError),
}
