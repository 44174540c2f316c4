//! Operation orchestrator: the synchronous bet, settle and cancel path.
//!
//! Each request is validated, checked against the duplicate guard and
//! recorded as a pending transaction before anything touches the wallet.
//! The orchestrator then makes one immediate attempt; anything that cannot
//! complete right now stays pending for the reconciliation worker.

pub mod manager;

pub use manager::Orchestrator;
