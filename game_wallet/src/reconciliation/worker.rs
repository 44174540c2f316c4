//! Reconciliation worker implementation.

use chrono::Utc;
use std::sync::Arc;
use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval, sleep},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ReconciliationConfig,
    db::{ClaimCriteria, TransactionStore},
    ledger::{LedgerError, LedgerResult, PlayerId, Transaction},
    metrics,
    settlement::{self, Outcome},
    wallet::WalletGateway,
};

/// Counts of what one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Stale processing claims returned to pending
    pub released: usize,
    /// Pending transactions failed for running out of attempts
    pub exhausted: usize,
    pub confirmed: usize,
    pub deferred: usize,
    pub failed: usize,
}

impl TickSummary {
    /// Number of transactions the drain phase claimed
    pub fn processed(&self) -> usize {
        self.confirmed + self.deferred + self.failed
    }
}

/// Background task driving pending transactions to a final state
pub struct ReconciliationWorker {
    store: Arc<dyn TransactionStore>,
    wallet: Arc<dyn WalletGateway>,
    config: ReconciliationConfig,
}

impl ReconciliationWorker {
    /// Create a new worker
    pub fn new(
        store: Arc<dyn TransactionStore>,
        wallet: Arc<dyn WalletGateway>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            store,
            wallet,
            config,
        }
    }

    /// Run the worker on its own task until `token` is cancelled
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(token).await })
    }

    /// Run the worker loop
    ///
    /// The first tick runs immediately so work left over from a previous
    /// process is picked up at startup. Cancellation interrupts the wait
    /// between ticks and the pause between transactions, but a claimed
    /// transaction is always carried through to a persisted outcome.
    pub async fn run(&self, token: CancellationToken) {
        log::info!(
            "Reconciliation worker starting (interval {:?}, max attempts {})",
            self.config.tick_interval,
            self.config.max_attempts
        );

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let summary = self.tick_until(&token).await;
                    if summary != TickSummary::default() {
                        log::info!(
                            "Reconciliation tick: {} released, {} exhausted, {} confirmed, {} deferred, {} failed",
                            summary.released,
                            summary.exhausted,
                            summary.confirmed,
                            summary.deferred,
                            summary.failed
                        );
                    }
                }
            }
        }

        log::info!("Reconciliation worker stopped");
    }

    /// Run one full pass
    pub async fn tick(&self) -> TickSummary {
        self.tick_until(&CancellationToken::new()).await
    }

    async fn tick_until(&self, token: &CancellationToken) -> TickSummary {
        metrics::reconciliation_tick();
        let mut summary = TickSummary::default();

        if let Err(e) = self.tick_inner(token, &mut summary).await {
            log::error!("Reconciliation tick aborted: {}", e);
        }

        metrics::reconciliation_outcome("released", summary.released);
        metrics::reconciliation_outcome("exhausted", summary.exhausted);
        metrics::reconciliation_outcome("confirmed", summary.confirmed);
        metrics::reconciliation_outcome("deferred", summary.deferred);
        metrics::reconciliation_outcome("failed", summary.failed);
        summary
    }

    async fn tick_inner(
        &self,
        token: &CancellationToken,
        summary: &mut TickSummary,
    ) -> LedgerResult<()> {
        let cutoff = chrono::Duration::from_std(self.config.stale_claim_after)
            .ok()
            .and_then(|stale_after| Utc::now().checked_sub_signed(stale_after));
        if let Some(cutoff) = cutoff {
            for tx in self.store.release_stale_claims(cutoff).await? {
                log::warn!(
                    "Released stale claim on {} transaction {} for player {} (claimed at {:?})",
                    tx.kind,
                    tx.id,
                    tx.player_id,
                    tx.claimed_at
                );
                summary.released += 1;
            }
        }

        for tx in self.store.fail_exhausted(self.config.max_attempts).await? {
            log::warn!(
                "{}",
                LedgerError::RetriesExhausted {
                    id: tx.id,
                    attempts: tx.attempts
                }
            );
            summary.exhausted += 1;
        }

        let mut criteria = ClaimCriteria {
            max_attempts: self.config.max_attempts,
            exclude_players: Vec::new(),
        };

        while !token.is_cancelled() {
            let Some(tx) = self.store.claim_next_processable(&criteria).await? else {
                break;
            };

            let player_id = tx.player_id;
            match self.process(tx, summary).await {
                Ok(Some(deferred)) => criteria.exclude_players.push(deferred),
                Ok(None) => {}
                Err(e) => {
                    log::error!(
                        "Reconciliation of player {} transaction failed: {}",
                        player_id,
                        e
                    );
                    criteria.exclude_players.push(player_id);
                }
            }

            if self.pause(token).await {
                break;
            }
        }

        Ok(())
    }

    /// Retry one claimed transaction, returning its player when deferred
    async fn process(
        &self,
        mut tx: Transaction,
        summary: &mut TickSummary,
    ) -> LedgerResult<Option<PlayerId>> {
        match settlement::record_attempt(self.store.as_ref(), &mut tx).await {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(e) => {
                settlement::release(self.store.as_ref(), &mut tx).await;
                return Err(e);
            }
        }
        log::debug!(
            "Retrying {} transaction {} for player {} (attempt {}/{})",
            tx.kind,
            tx.id,
            tx.player_id,
            tx.attempts,
            self.config.max_attempts
        );

        let outcome =
            match settlement::apply(self.store.as_ref(), self.wallet.as_ref(), &tx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    settlement::release(self.store.as_ref(), &mut tx).await;
                    return Err(e);
                }
            };

        match outcome {
            Outcome::Applied(applied) => {
                if !settlement::confirm(self.store.as_ref(), &mut tx, applied.referenced).await? {
                    return Ok(None);
                }
                log::info!(
                    "Reconciled {} transaction {} for player {}",
                    tx.kind,
                    tx.id,
                    tx.player_id
                );
                summary.confirmed += 1;
                Ok(None)
            }
            Outcome::Deferred(reason) => {
                log::warn!(
                    "Deferring {} transaction {} for player {} after attempt {}: {}",
                    tx.kind,
                    tx.id,
                    tx.player_id,
                    tx.attempts,
                    reason
                );
                settlement::release(self.store.as_ref(), &mut tx).await;
                summary.deferred += 1;
                Ok(Some(tx.player_id))
            }
            Outcome::Failed(err) => {
                log::error!(
                    "{} transaction {} for player {} failed: {}",
                    tx.kind,
                    tx.id,
                    tx.player_id,
                    err
                );
                if settlement::fail(self.store.as_ref(), &mut tx).await? {
                    summary.failed += 1;
                }
                Ok(None)
            }
        }
    }

    /// Sleep between transactions; true when cancelled meanwhile
    async fn pause(&self, token: &CancellationToken) -> bool {
        if self.config.pause_between.is_zero() {
            return token.is_cancelled();
        }
        tokio::select! {
            _ = token.cancelled() => true,
            _ = sleep(self.config.pause_between) => false,
        }
    }
}
