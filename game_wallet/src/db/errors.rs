//! Transaction store error types.

use std::time::Duration;
use thiserror::Error;

/// Transaction store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Query did not finish in time
    #[error("Database operation timed out after {0:?}")]
    Timeout(Duration),

    /// Provider reference already stored
    #[error("Provider reference already recorded: {0}")]
    DuplicateProviderRef(String),

    /// Row could not be mapped back to a transaction
    #[error("Corrupt transaction row: {0}")]
    Corrupt(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
