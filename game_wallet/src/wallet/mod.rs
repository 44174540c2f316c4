//! Wallet gateway: the boundary to the external wallet holding player balances.
//!
//! This module provides:
//! - The [`WalletGateway`] trait consumed by the orchestrator and worker
//! - An HTTP implementation, [`HttpWalletGateway`]
//! - Gateway errors split into retryable failures and final rejections
//!
//! Every debit and credit carries the ledger transaction ID as its
//! `reference`. The wallet may use it for idempotency, but correctness here
//! rests on the ledger's own state machine.
//!
//! ## Example
//!
//! ```no_run
//! use game_wallet::wallet::{HttpWalletGateway, WalletConfig, WalletGateway};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = HttpWalletGateway::new(&WalletConfig::from_env())?;
//!     let balance = gateway.get_balance(1).await?;
//!     println!("{} {}", balance.balance, balance.currency);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::ledger::PlayerId;

pub mod client;
pub mod config;
pub mod errors;
pub mod models;

pub use client::HttpWalletGateway;
pub use config::WalletConfig;
pub use errors::{GatewayError, GatewayResult};
pub use models::{Balance, WalletOperation};

/// Synchronous (request/response) access to the external wallet
#[async_trait]
pub trait WalletGateway: Send + Sync {
    /// Current balance of a player
    async fn get_balance(&self, player_id: PlayerId) -> GatewayResult<Balance>;

    /// Debit the player, returning the new balance
    async fn debit(&self, op: &WalletOperation) -> GatewayResult<Decimal>;

    /// Credit the player, returning the new balance
    async fn credit(&self, op: &WalletOperation) -> GatewayResult<Decimal>;
}
