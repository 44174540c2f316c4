//! Wallet gateway configuration.

use std::env;

/// Wallet gateway configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConfig {
    /// Base URL of the wallet API
    pub base_url: String,

    /// Bearer token sent with every request
    pub api_key: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl WalletConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `WALLET_API_URL`: Base URL (default: `http://localhost:8000`)
    /// - `WALLET_API_KEY`: Bearer token (default: empty)
    /// - `WALLET_TIMEOUT_SECS`: Request timeout (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("WALLET_API_URL").unwrap_or(defaults.base_url),
            api_key: env::var("WALLET_API_KEY").unwrap_or(defaults.api_key),
            timeout_secs: env::var("WALLET_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}
