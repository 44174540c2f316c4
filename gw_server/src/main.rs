//! Game wallet reconciliation service.
//!
//! Connects to the transaction ledger and the external wallet, then runs the
//! reconciliation worker until Ctrl+C.

mod config;
mod logging;
mod metrics;

use std::sync::Arc;

use anyhow::Error;
use game_wallet::{ReconciliationWorker, db::Database, wallet::HttpWalletGateway};
use log::info;
use pico_args::Arguments;
use tokio_util::sync::CancellationToken;

use config::{Overrides, ServerConfig};

const HELP: &str = "\
Run the game wallet reconciliation service

USAGE:
  gw_server [OPTIONS]

OPTIONS:
  --db-url        URL        Database connection string  [default: env DATABASE_URL]
  --wallet-url    URL        Wallet API base URL         [default: env WALLET_API_URL or http://localhost:8000]
  --metrics-bind  IP:PORT    Prometheus scrape address   [default: env METRICS_BIND or 127.0.0.1:9090]

FLAGS:
  -h, --help                 Print help information

ENVIRONMENT:
  DATABASE_URL               PostgreSQL connection string
  WALLET_API_KEY             Wallet bearer token (required)
  WALLET_TIMEOUT_SECS        Wallet request timeout
  RECONCILE_INTERVAL_SECS    Seconds between worker ticks
  RECONCILE_MAX_ATTEMPTS     Worker attempts before a transaction fails
  RECONCILE_PAUSE_MS         Pause between transactions within a tick
  RECONCILE_STALE_CLAIM_SECS Age at which an abandoned claim is released
  (See .env file for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let overrides = Overrides {
        database_url: pargs.opt_value_from_str("--db-url")?,
        wallet_url: pargs.opt_value_from_str("--wallet-url")?,
        metrics_bind: pargs.opt_value_from_str("--metrics-bind")?,
    };

    logging::init();

    let config = ServerConfig::from_env(overrides)?;
    config.validate()?;
    logging::log_startup(&config);

    metrics::init_metrics(config.metrics_bind).map_err(|e| anyhow::anyhow!(e))?;
    info!("Metrics available at http://{}/metrics", config.metrics_bind);

    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    db.health_check()
        .await
        .map_err(|e| anyhow::anyhow!("Database health check failed: {}", e))?;
    info!("Database connected successfully");

    let wallet = HttpWalletGateway::new(&config.wallet)
        .map_err(|e| anyhow::anyhow!("Failed to build wallet client: {}", e))?;

    let worker = ReconciliationWorker::new(
        Arc::new(db.transaction_store()),
        Arc::new(wallet),
        config.reconciliation.clone(),
    );

    let token = CancellationToken::new();
    let handle = worker.spawn(token.clone());
    info!("Reconciliation worker running. Press Ctrl+C to stop.");

    shutdown_signal().await;
    info!("Shutting down, waiting for the current transaction to finish...");

    token.cancel();
    if let Err(e) = handle.await {
        log::error!("Reconciliation worker ended abnormally: {}", e);
    }

    db.close().await;
    info!("Shutdown complete");

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C, shutting down: {}", e);
    }
}
