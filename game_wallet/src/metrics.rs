//! Ledger and reconciliation metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! host process installs a recorder (the server installs a Prometheus one).

// ============================================================================
// Orchestrator Metrics
// ============================================================================

/// Record the outcome of a bet, settle or cancel request.
///
/// `outcome` is a transaction status (`confirmed`, `pending`, `failed`) or
/// an error label.
pub fn ledger_operation(operation: &'static str, outcome: &str) {
    metrics::counter!("ledger_operations_total",
        "operation" => operation,
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record one wallet call and whether it succeeded.
pub fn wallet_call(call: &'static str, success: bool) {
    metrics::counter!("wallet_calls_total",
        "call" => call,
        "success" => success.to_string()
    )
    .increment(1);
}

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Increment worker tick counter.
pub fn reconciliation_tick() {
    metrics::counter!("reconciliation_ticks_total").increment(1);
}

/// Record transactions reaching an outcome in the worker.
pub fn reconciliation_outcome(outcome: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    metrics::counter!("reconciliation_transactions_total",
        "outcome" => outcome
    )
    .increment(count as u64);
}
