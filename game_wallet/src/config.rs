//! Reconciliation settings shared by the orchestrator and the worker.

use std::env;
use std::time::Duration;

use crate::db::timeouts::{CLAIM_TIMEOUT, DEFAULT_QUERY_TIMEOUT};

/// Store round trips made while a claim is held, besides the claim itself:
/// attempt count, reference lookup, reference re-read and the outcome write
const QUERIES_UNDER_CLAIM: u32 = 4;

/// Wallet calls made while a claim is held: balance read, then debit or credit
const WALLET_CALLS_UNDER_CLAIM: u32 = 2;

/// Reconciliation configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationConfig {
    /// Time between worker ticks (default: 30s)
    pub tick_interval: Duration,

    /// Worker attempts before a transaction is failed (default: 3)
    pub max_attempts: u32,

    /// Pause after each processed transaction (default: 1s)
    pub pause_between: Duration,

    /// Age after which a processing claim is considered abandoned (default: 5 min)
    pub stale_claim_after: Duration,
}

impl ReconciliationConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `RECONCILE_INTERVAL_SECS` (default: 30)
    /// - `RECONCILE_MAX_ATTEMPTS` (default: 3)
    /// - `RECONCILE_PAUSE_MS` (default: 1000)
    /// - `RECONCILE_STALE_CLAIM_SECS` (default: 300)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tick_interval: env_secs("RECONCILE_INTERVAL_SECS").unwrap_or(defaults.tick_interval),
            max_attempts: env::var("RECONCILE_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_attempts),
            pause_between: env::var("RECONCILE_PAUSE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.pause_between),
            stale_claim_after: env_secs("RECONCILE_STALE_CLAIM_SECS")
                .unwrap_or(defaults.stale_claim_after),
        }
    }
}

impl ReconciliationConfig {
    /// Longest time a live claim can be held given the wallet timeout.
    ///
    /// `stale_claim_after` must exceed this, otherwise a claim still in
    /// flight can be released and its wallet call repeated by the worker.
    pub fn min_stale_claim_after(wallet_timeout: Duration) -> Duration {
        CLAIM_TIMEOUT
            + wallet_timeout * WALLET_CALLS_UNDER_CLAIM
            + DEFAULT_QUERY_TIMEOUT * QUERIES_UNDER_CLAIM
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            max_attempts: 3,
            pause_between: Duration::from_secs(1),
            stale_claim_after: Duration::from_secs(300),
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
}
