//! Wallet gateway error types.

use std::time::Duration;
use thiserror::Error;

/// Wallet gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request did not complete within the gateway timeout
    #[error("Wallet request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection-level failure
    #[error("Wallet network error: {0}")]
    Network(String),

    /// Wallet answered with a server error
    #[error("Wallet unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    /// Wallet refused the operation (e.g. insufficient funds)
    #[error("Wallet rejected request: {code} ({message})")]
    Rejected { code: String, message: String },

    /// Response body could not be understood
    #[error("Invalid wallet response: {0}")]
    Decode(String),

    /// Wallet reported success but the body could not be read, so the
    /// outcome of the call is unknown and it must not be repeated
    #[error("Wallet accepted the request (HTTP {status}) but its response was unreadable: {detail}")]
    UnreadableSuccess { status: u16, detail: String },
}

impl GatewayError {
    /// Whether repeating the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            GatewayError::Rejected { .. } | GatewayError::UnreadableSuccess { .. }
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

/// Result type for wallet gateway calls
pub type GatewayResult<T> = Result<T, GatewayError>;
