//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use game_wallet::{ReconciliationConfig, db::DatabaseConfig, wallet::WalletConfig};
use std::net::SocketAddr;
use std::time::Duration;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Wallet gateway configuration
    pub wallet: WalletConfig,
    /// Reconciliation worker configuration
    pub reconciliation: ReconciliationConfig,
    /// Prometheus scrape endpoint address
    pub metrics_bind: SocketAddr,
}

/// Values given on the command line, taking precedence over the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub wallet_url: Option<String>,
    pub metrics_bind: Option<SocketAddr>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `overrides` - Values from CLI args
    ///
    /// # Returns
    ///
    /// * `Result<ServerConfig, ConfigError>` - Loaded configuration or error
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(overrides: Overrides) -> Result<Self, ConfigError> {
        let mut database = DatabaseConfig::from_env();
        if let Some(url) = overrides.database_url {
            database.database_url = url;
        }

        // Wallet API key (REQUIRED)
        let api_key = std::env::var("WALLET_API_KEY").map_err(|_| ConfigError::MissingRequired {
            var: "WALLET_API_KEY".to_string(),
            hint: "Bearer token issued by the wallet operator".to_string(),
        })?;

        let mut wallet = WalletConfig::from_env();
        wallet.api_key = api_key;
        if let Some(url) = overrides.wallet_url {
            wallet.base_url = url;
        }

        let metrics_bind = match overrides.metrics_bind {
            Some(addr) => addr,
            None => match std::env::var("METRICS_BIND") {
                Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                    var: "METRICS_BIND".to_string(),
                    reason: format!("'{value}' is not an IP:PORT address"),
                })?,
                Err(_) => SocketAddr::from(([127, 0, 0, 1], 9090)),
            },
        };

        Ok(ServerConfig {
            database,
            wallet,
            reconciliation: ReconciliationConfig::from_env(),
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.wallet.base_url.starts_with("http://")
            && !self.wallet.base_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid {
                var: "WALLET_API_URL".to_string(),
                reason: "Must be an http:// or https:// URL".to_string(),
            });
        }

        if self.wallet.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid {
                var: "WALLET_API_KEY".to_string(),
                reason: "Must not be empty".to_string(),
            });
        }

        if self.wallet.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "WALLET_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.reconciliation.tick_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "RECONCILE_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.reconciliation.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "RECONCILE_MAX_ATTEMPTS".to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }

        // A live claim must never be mistaken for an abandoned one
        let min_stale = ReconciliationConfig::min_stale_claim_after(Duration::from_secs(
            self.wallet.timeout_secs,
        ));
        if self.reconciliation.stale_claim_after <= min_stale {
            return Err(ConfigError::Invalid {
                var: "RECONCILE_STALE_CLAIM_SECS".to_string(),
                reason: format!(
                    "Must be greater than {}s (two wallet calls of {}s plus store timeouts)",
                    min_stale.as_secs(),
                    self.wallet.timeout_secs
                ),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}
