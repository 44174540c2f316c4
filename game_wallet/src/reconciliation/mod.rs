//! Reconciliation worker: retries what the orchestrator had to leave pending.
//!
//! Every tick the worker
//! 1. returns processing claims abandoned longer than `stale_claim_after` to pending,
//! 2. fails pending transactions that have used up `max_attempts`,
//! 3. drains the remaining pending transactions oldest first, one at a time.
//!
//! A player whose transaction is deferred during a tick is skipped for the
//! rest of that tick, so a later settle or cancel never overtakes the bet
//! it depends on.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use game_wallet::{
//!     config::ReconciliationConfig,
//!     db::MemoryTransactionStore,
//!     reconciliation::ReconciliationWorker,
//!     wallet::{HttpWalletGateway, WalletConfig},
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let worker = ReconciliationWorker::new(
//!         Arc::new(MemoryTransactionStore::new()),
//!         Arc::new(HttpWalletGateway::new(&WalletConfig::from_env())?),
//!         ReconciliationConfig::from_env(),
//!     );
//!     let token = CancellationToken::new();
//!     let handle = worker.spawn(token.clone());
//!     token.cancel();
//!     handle.await?;
//!     Ok(())
//! }
//! ```

pub mod worker;

pub use worker::{ReconciliationWorker, TickSummary};
