use rusqlite::ErrorCode;
use thiserror::Error;

use super::models::EntityKind;

/// Errors raised by the catalog store.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A constraint rejected the write (duplicate key, missing parent row, ...).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The database could not be opened, is locked or failed at the I/O level.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),
}

impl CatalogError {
    /// Only an unavailable store aborts a whole request, everything else is
    /// scoped to the single row being written.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CatalogError::StorageUnavailable(_))
    }

    pub(crate) fn lock_poisoned() -> Self {
        CatalogError::StorageUnavailable("catalog connection lock poisoned".to_string())
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => CatalogError::Conflict(err.to_string()),
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::ReadOnly
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt,
            ) => CatalogError::StorageUnavailable(err.to_string()),
            _ => CatalogError::Sqlite(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
