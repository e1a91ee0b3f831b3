//! Ledger error types.

use thiserror::Error;

/// Errors surfaced by the storage ledger and volume repository.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("no storage with {requested} free units available")]
    NoCapacity { requested: i64 },

    #[error("invalid resize: new capacity {requested} is below current {current}")]
    InvalidResize { current: i64, requested: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Map a unique-constraint violation to `AlreadyExists`, leaving everything
/// else as a database error.
pub(crate) fn map_unique_violation(err: sqlx::Error, what: impl FnOnce() -> String) -> LedgerError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => LedgerError::AlreadyExists(what()),
        _ => LedgerError::Database(err),
    }
}
