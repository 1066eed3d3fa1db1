use database::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid ARR write: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Stale ARR change: {0}")]
    Conflict(String),

    #[error("Ledger storage failed: {0}")]
    Database(DbError),
}

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => LedgerError::NotFound(what),
            DbError::Conflict(what) => LedgerError::Conflict(what),
            other => LedgerError::Database(other),
        }
    }
}
