//! Operation orchestrator implementation.

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::{
    config::ReconciliationConfig,
    db::TransactionStore,
    ledger::{
        LedgerError, LedgerResult, OperationResult, PlayerId, Transaction, TransactionKind,
        TransactionStatus, guard,
    },
    metrics,
    settlement::{self, Outcome},
    wallet::WalletGateway,
};

/// Synchronous entry point for provider bet, settle and cancel requests
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn TransactionStore>,
    wallet: Arc<dyn WalletGateway>,
    config: ReconciliationConfig,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// # Arguments
    ///
    /// * `store` - Transaction store
    /// * `wallet` - Wallet gateway
    /// * `config` - Reconciliation settings of the worker that picks up deferrals
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

    /// Record a bet and try to debit the wallet immediately
    ///
    /// # Arguments
    ///
    /// * `player_id` - Authenticated player
    /// * `provider_ref` - Provider's ID for this bet
    /// * `amount` - Stake, strictly positive
    /// * `currency` - Currency code
    ///
    /// # Returns
    ///
    /// * `LedgerResult<OperationResult>` - `Confirmed` with balances, or
    ///   `Pending` when the debit was deferred to the reconciliation worker
    ///
    /// # Errors
    ///
    /// * `LedgerError::Validation` - Empty reference/currency or non-positive amount
    /// * `LedgerError::DuplicateOperation` - Provider reference already used
    /// * `LedgerError::WalletRejected` - Wallet refused the debit; the bet is `Failed`
    pub async fn place_bet(
        &self,
        player_id: PlayerId,
        provider_ref: &str,
        amount: Decimal,
        currency: &str,
    ) -> LedgerResult<OperationResult> {
        let result = async {
            validate_request(provider_ref, currency)?;
            if amount <= Decimal::ZERO {
                return Err(LedgerError::Validation(format!(
                    "bet amount must be positive, got {amount}"
                )));
            }
            guard::ensure_unique(self.store.as_ref(), provider_ref).await?;

            let tx = Transaction::withdraw(player_id, provider_ref, amount, currency);
            self.record(&tx).await?;
            self.attempt(tx).await
        }
        .await;

        record_metric("place_bet", &result);
        result
    }

    /// Record the settlement of a bet and credit the winnings
    ///
    /// A zero `amount` settles a lost bet: no credit is issued but the bet
    /// is still finalized.
    ///
    /// # Errors
    ///
    /// * `LedgerError::DuplicateOperation` - Provider reference already used
    /// * `LedgerError::ReferenceNotFound` - No bet with `bet_ref`
    /// * `LedgerError::OwnershipMismatch` - The bet belongs to another player
    /// * `LedgerError::AlreadyFinalized` - The bet was settled or cancelled
    /// * `LedgerError::InvalidPriorState` - The bet failed or is not a bet
    pub async fn settle(
        &self,
        player_id: PlayerId,
        provider_ref: &str,
        bet_ref: &str,
        amount: Decimal,
        currency: &str,
    ) -> LedgerResult<OperationResult> {
        let result = async {
            validate_request(provider_ref, currency)?;
            if amount < Decimal::ZERO {
                return Err(LedgerError::Validation(format!(
                    "settle amount must not be negative, got {amount}"
                )));
            }
            guard::ensure_unique(self.store.as_ref(), provider_ref).await?;

            let bet = self.resolve_reference(player_id, bet_ref).await?;
            if bet.kind != TransactionKind::Withdraw {
                return Err(LedgerError::InvalidPriorState {
                    provider_ref: bet_ref.to_string(),
                    status: bet.status,
                });
            }
            ensure_referenceable(&bet)?;
            if bet.currency != currency {
                return Err(LedgerError::Validation(format!(
                    "settle currency {currency} does not match bet currency {}",
                    bet.currency
                )));
            }

            let tx = Transaction::deposit(player_id, provider_ref, bet_ref, amount, currency);
            self.record(&tx).await?;
            self.attempt(tx).await
        }
        .await;

        record_metric("settle", &result);
        result
    }

    /// Reverse a prior bet or settle
    ///
    /// Reversing a bet credits its amount back; reversing a settle debits it.
    ///
    /// # Errors
    ///
    /// * `LedgerError::ReferenceNotFound` - No transaction with `reference`
    /// * `LedgerError::OwnershipMismatch` - It belongs to another player
    /// * `LedgerError::AlreadyFinalized` - It was settled or already reversed
    /// * `LedgerError::InvalidPriorState` - It failed
    /// * `LedgerError::NonReversibleOperation` - It is itself a cancel
    /// * `LedgerError::DuplicateOperation` - A cancel for it is already recorded
    pub async fn cancel(
        &self,
        player_id: PlayerId,
        reference: &str,
    ) -> LedgerResult<OperationResult> {
        let result = async {
            if reference.trim().is_empty() {
                return Err(LedgerError::Validation(
                    "reference must not be empty".to_string(),
                ));
            }

            let original = self.resolve_reference(player_id, reference).await?;
            if original.kind == TransactionKind::Cancel {
                return Err(LedgerError::NonReversibleOperation(reference.to_string()));
            }
            ensure_referenceable(&original)?;

            let tx = Transaction::cancel_of(&original);
            guard::ensure_unique(self.store.as_ref(), &tx.provider_ref).await?;
            self.record(&tx).await?;
            self.attempt(tx).await
        }
        .await;

        record_metric("cancel", &result);
        result
    }

    async fn record(&self, tx: &Transaction) -> LedgerResult<()> {
        self.store
            .create_transaction(tx)
            .await
            .map_err(guard::map_insert_conflict)?;
        log::debug!(
            "Recorded {} transaction {} for player {} ({})",
            tx.kind,
            tx.id,
            tx.player_id,
            tx.provider_ref
        );
        Ok(())
    }

    async fn resolve_reference(
        &self,
        player_id: PlayerId,
        reference: &str,
    ) -> LedgerResult<Transaction> {
        let referenced = self
            .store
            .get_by_provider_ref(reference)
            .await?
            .ok_or_else(|| LedgerError::ReferenceNotFound(reference.to_string()))?;

        if referenced.player_id != player_id {
            return Err(LedgerError::OwnershipMismatch {
                provider_ref: reference.to_string(),
            });
        }
        Ok(referenced)
    }

    /// Apply a freshly recorded transaction now, or leave it to the worker
    async fn attempt(&self, tx: Transaction) -> LedgerResult<OperationResult> {
        if self.store.has_open_transactions(tx.player_id, tx.id).await? {
            log::info!(
                "Player {} has open transactions, keeping {} transaction {} pending",
                tx.player_id,
                tx.kind,
                tx.id
            );
            return Ok(result_of(&tx, None, None));
        }

        let Some(mut tx) = self.store.claim_transaction(tx.id).await? else {
            log::info!(
                "Transaction {} could not be claimed, leaving it to the worker",
                tx.id
            );
            return Ok(result_of(&tx, None, None));
        };

        let old_balance = match self.wallet.get_balance(tx.player_id).await {
            Ok(balance) => {
                metrics::wallet_call("balance", true);
                balance.balance
            }
            Err(e) => {
                log::error!(
                    "Failed to get balance for player {}, keeping transaction {} pending: {}",
                    tx.player_id,
                    tx.id,
                    e
                );
                metrics::wallet_call("balance", false);
                if !settlement::release(self.store.as_ref(), &mut tx).await {
                    tx = self.stored(tx).await?;
                }
                return Ok(result_of(&tx, None, None));
            }
        };

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
                let new_balance = applied.new_balance.unwrap_or(old_balance);
                if !settlement::confirm(self.store.as_ref(), &mut tx, applied.referenced).await? {
                    let tx = self.stored(tx).await?;
                    return Ok(result_of(&tx, Some(old_balance), Some(new_balance)));
                }
                log::info!(
                    "Confirmed {} transaction {} for player {}: {} -> {}",
                    tx.kind,
                    tx.id,
                    tx.player_id,
                    old_balance,
                    new_balance
                );
                Ok(result_of(&tx, Some(old_balance), Some(new_balance)))
            }
            Outcome::Deferred(reason) => {
                log::error!(
                    "Keeping {} transaction {} pending for player {} (up to {} retries every {:?}): {}",
                    tx.kind,
                    tx.id,
                    tx.player_id,
                    self.config.max_attempts,
                    self.config.tick_interval,
                    reason
                );
                if !settlement::release(self.store.as_ref(), &mut tx).await {
                    tx = self.stored(tx).await?;
                }
                Ok(result_of(&tx, Some(old_balance), Some(old_balance)))
            }
            Outcome::Failed(err) => {
                log::warn!(
                    "{} transaction {} for player {} failed: {}",
                    tx.kind,
                    tx.id,
                    tx.player_id,
                    err
                );
                settlement::fail(self.store.as_ref(), &mut tx).await?;
                Err(err)
            }
        }
    }

    /// Latest stored version of a transaction whose claim was lost
    async fn stored(&self, tx: Transaction) -> LedgerResult<Transaction> {
        Ok(self.store.get_by_id(tx.id).await?.unwrap_or(tx))
    }
}

fn validate_request(provider_ref: &str, currency: &str) -> LedgerResult<()> {
    if provider_ref.trim().is_empty() {
        return Err(LedgerError::Validation(
            "provider reference must not be empty".to_string(),
        ));
    }
    if currency.trim().is_empty() {
        return Err(LedgerError::Validation(
            "currency must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// A settle or cancel may only reference a transaction that is still open or confirmed
fn ensure_referenceable(referenced: &Transaction) -> LedgerResult<()> {
    match referenced.status {
        status if status.is_closed() => Err(LedgerError::AlreadyFinalized(
            referenced.provider_ref.clone(),
        )),
        TransactionStatus::Failed => Err(LedgerError::InvalidPriorState {
            provider_ref: referenced.provider_ref.clone(),
            status: referenced.status,
        }),
        _ => Ok(()),
    }
}

fn result_of(
    tx: &Transaction,
    old_balance: Option<Decimal>,
    new_balance: Option<Decimal>,
) -> OperationResult {
    OperationResult {
        transaction_id: tx.id,
        provider_ref: tx.provider_ref.clone(),
        old_balance,
        new_balance,
        status: tx.status,
    }
}

fn record_metric(operation: &'static str, result: &LedgerResult<OperationResult>) {
    match result {
        Ok(r) => metrics::ledger_operation(operation, &r.status.to_string()),
        Err(e) => metrics::ledger_operation(operation, e.label()),
    }
}
