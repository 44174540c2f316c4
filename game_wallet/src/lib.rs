//! # Game Wallet
//!
//! Transaction reconciliation between a game provider and an external wallet.
//!
//! The provider asks for bets (debits), settlements (credits) and
//! cancellations (reversals). Each request is recorded in a durable ledger
//! before the wallet is touched, applied immediately when possible, and
//! otherwise retried by a background worker until it is confirmed or failed.
//! A player never has more than one transaction in flight against the wallet.
//!
//! ## Core Modules
//!
//! - [`ledger`]: Transaction entity, state machine, errors and duplicate guard
//! - [`db`]: Transaction store trait with PostgreSQL and in-memory backends
//! - [`wallet`]: Wallet gateway trait and its HTTP client
//! - [`orchestrator`]: Synchronous bet, settle and cancel operations
//! - [`reconciliation`]: Interval worker retrying pending transactions
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use game_wallet::{
//!     Orchestrator, ReconciliationConfig,
//!     db::MemoryTransactionStore,
//!     wallet::{HttpWalletGateway, WalletConfig},
//! };
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(MemoryTransactionStore::new()),
//!         Arc::new(HttpWalletGateway::new(&WalletConfig::from_env())?),
//!         ReconciliationConfig::default(),
//!     );
//!     let result = orchestrator.place_bet(42, "round-1", Decimal::TEN, "USD").await?;
//!     println!("{} is {}", result.transaction_id, result.status);
//!     Ok(())
//! }
//! ```

/// Reconciliation settings.
pub mod config;
pub use config::ReconciliationConfig;

/// Transaction persistence.
pub mod db;

/// Transaction ledger and state machine.
pub mod ledger;
pub use ledger::{
    LedgerError, LedgerResult, OperationResult, PlayerId, Transaction, TransactionKind,
    TransactionStatus,
};

/// Operation metrics.
pub mod metrics;

/// Bet, settle and cancel entry points.
pub mod orchestrator;
pub use orchestrator::Orchestrator;

/// Background retry worker.
pub mod reconciliation;
pub use reconciliation::{ReconciliationWorker, TickSummary};

mod settlement;

/// External wallet access.
pub mod wallet;
