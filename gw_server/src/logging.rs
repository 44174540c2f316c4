//! Structured logging configuration.
//!
//! The library logs through the `log` facade; those records are forwarded
//! into the tracing subscriber installed here.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info,sqlx=warn,reqwest=warn";

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var.
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log the effective configuration without secrets
pub fn log_startup(config: &crate::config::ServerConfig) {
    tracing::info!(
        wallet_url = %config.wallet.base_url,
        wallet_timeout_secs = config.wallet.timeout_secs,
        tick_interval_secs = config.reconciliation.tick_interval.as_secs(),
        max_attempts = config.reconciliation.max_attempts,
        stale_claim_secs = config.reconciliation.stale_claim_after.as_secs(),
        metrics_bind = %config.metrics_bind,
        "Configuration loaded"
    );
}
