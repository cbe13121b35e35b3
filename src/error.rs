//! Crate-level error taxonomy.
//!
//! Storage backends report infrastructure failures as [`StorageError`];
//! services translate storage outcomes into the domain [`Error`] returned to
//! callers. Nothing is swallowed: every failure surfaces as a typed result.

use crate::identifier::ExhaustedError;
use crate::model::ActionType;

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A concurrent writer held the lock; the operation can be retried as-is.
    #[error("Storage conflict: {0}")]
    Conflict(String),

    #[error("Receipt identifier already in use: {0}")]
    DuplicateIdentifier(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl StorageError {
    /// Whether retrying the single operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Conflict(_) | StorageError::DuplicateIdentifier(_)
        )
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            // SQLITE_BUSY (5), SQLITE_LOCKED (6) and their extended codes
            let busy = db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| matches!(code & 0xff, 5 | 6))
                .unwrap_or(false);
            if busy {
                return StorageError::Conflict(db.message().to_string());
            }
        }
        if matches!(err, sqlx::Error::PoolTimedOut) {
            return StorageError::Conflict("connection pool timed out".to_string());
        }
        StorageError::Database(err)
    }
}

/// Errors returned by ledger, entitlement and subscription operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Receipt {identifier} has already been claimed")]
    AlreadyClaimed { identifier: String },

    #[error("Insufficient points: available {available}, requested {requested}")]
    InsufficientPoints { available: u64, requested: u64 },

    #[error(transparent)]
    Exhausted(#[from] ExhaustedError),

    #[error("Quota exceeded for {action}: used {used} of {limit}")]
    QuotaExceeded {
        action: ActionType,
        used: u32,
        limit: u32,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Storage conflicts are retryable; domain outcomes never are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(e) if e.is_retryable())
    }
}
