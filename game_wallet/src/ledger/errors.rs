//! Ledger error types.

use thiserror::Error;
use uuid::Uuid;

use super::models::TransactionStatus;
use crate::db::StoreError;
use crate::wallet::GatewayError;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed request payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// Provider reference already used
    #[error("Duplicate operation: {0}")]
    DuplicateOperation(String),

    /// Referenced transaction does not exist
    #[error("Referenced transaction not found: {0}")]
    ReferenceNotFound(String),

    /// Referenced transaction belongs to another player
    #[error("Transaction {provider_ref} does not belong to this player")]
    OwnershipMismatch { provider_ref: String },

    /// Referenced transaction is already finalized or compensated
    #[error("Transaction already finalized: {0}")]
    AlreadyFinalized(String),

    /// Referenced transaction is in a state that forbids the operation
    #[error("Transaction {provider_ref} is {status} and cannot be referenced")]
    InvalidPriorState {
        provider_ref: String,
        status: TransactionStatus,
    },

    /// Cancelling a cancel
    #[error("Cancel transactions cannot be reversed: {0}")]
    NonReversibleOperation(String),

    /// Transient wallet failure
    #[error("Wallet unavailable: {0}")]
    WalletUnavailable(GatewayError),

    /// Wallet refused the operation
    #[error("Wallet rejected operation: {0}")]
    WalletRejected(GatewayError),

    /// Worker gave up on a transaction
    #[error("Retries exhausted for transaction {id} after {attempts} attempts")]
    RetriesExhausted { id: Uuid, attempts: u32 },

    /// Illegal state machine move
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Transaction store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Map a gateway failure to the deferrable or the terminal variant
    pub fn from_gateway(err: GatewayError) -> Self {
        if err.is_retryable() {
            LedgerError::WalletUnavailable(err)
        } else {
            LedgerError::WalletRejected(err)
        }
    }

    /// The operation should be left pending for the worker
    pub fn is_deferral(&self) -> bool {
        matches!(self, LedgerError::WalletUnavailable(_))
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::Store(_) | LedgerError::InvalidTransition { .. } => {
                "Internal server error".to_string()
            }
            LedgerError::WalletUnavailable(_) => "Wallet service unavailable".to_string(),
            LedgerError::WalletRejected(GatewayError::Rejected { code, .. }) => {
                format!("Wallet rejected operation: {code}")
            }
            LedgerError::WalletRejected(GatewayError::UnreadableSuccess { .. }) => {
                "Wallet outcome unknown".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Short label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation",
            LedgerError::DuplicateOperation(_) => "duplicate",
            LedgerError::ReferenceNotFound(_) => "reference_not_found",
            LedgerError::OwnershipMismatch { .. } => "ownership_mismatch",
            LedgerError::AlreadyFinalized(_) => "already_finalized",
            LedgerError::InvalidPriorState { .. } => "invalid_prior_state",
            LedgerError::NonReversibleOperation(_) => "non_reversible",
            LedgerError::WalletUnavailable(_) => "wallet_unavailable",
            LedgerError::WalletRejected(_) => "wallet_rejected",
            LedgerError::RetriesExhausted { .. } => "retries_exhausted",
            LedgerError::InvalidTransition { .. } => "invalid_transition",
            LedgerError::Store(_) => "store",
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
