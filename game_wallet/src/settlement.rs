//! Wallet application of a claimed transaction.
//!
//! Shared by the orchestrator's immediate attempt and the worker's retries:
//! both must issue exactly the same wallet call and apply exactly the same
//! side effect on the referenced transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    db::TransactionStore,
    ledger::{LedgerError, LedgerResult, Transaction, TransactionKind, TransactionStatus},
    metrics,
    wallet::{WalletGateway, WalletOperation},
};

/// Successful wallet application
#[derive(Debug)]
pub(crate) struct Applied {
    /// Balance reported by the wallet, `None` when no call was needed
    pub new_balance: Option<Decimal>,
    /// Transaction to close out once this one is confirmed
    pub referenced: Option<Transaction>,
}

/// What happened when a claimed transaction was applied
#[derive(Debug)]
pub(crate) enum Outcome {
    Applied(Applied),
    /// Try again later
    Deferred(LedgerError),
    Failed(LedgerError),
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Debit,
    Credit,
}

/// Resolve the referenced transaction of a settle or cancel.
///
/// Returns the outcome to report when the reference is not usable.
async fn usable_reference(
    store: &dyn TransactionStore,
    tx: &Transaction,
) -> LedgerResult<Result<Transaction, Outcome>> {
    let Some(reference) = tx.reversal_of_provider_ref.as_deref() else {
        return Ok(Err(Outcome::Failed(LedgerError::Validation(format!(
            "{} transaction {} has no reference",
            tx.kind, tx.id
        )))));
    };

    let Some(referenced) = store.get_by_provider_ref(reference).await? else {
        return Ok(Err(Outcome::Failed(LedgerError::ReferenceNotFound(
            reference.to_string(),
        ))));
    };

    let rejection = match (tx.kind, referenced.kind) {
        (TransactionKind::Cancel, TransactionKind::Cancel) => Some(
            LedgerError::NonReversibleOperation(reference.to_string()),
        ),
        (TransactionKind::Deposit, kind) if kind != TransactionKind::Withdraw => {
            Some(LedgerError::InvalidPriorState {
                provider_ref: reference.to_string(),
                status: referenced.status,
            })
        }
        _ => None,
    };
    if let Some(err) = rejection {
        return Ok(Err(Outcome::Failed(err)));
    }

    let outcome = match referenced.status {
        TransactionStatus::Confirmed => return Ok(Ok(referenced)),
        TransactionStatus::Pending | TransactionStatus::Processing => {
            Outcome::Deferred(LedgerError::InvalidPriorState {
                provider_ref: reference.to_string(),
                status: referenced.status,
            })
        }
        TransactionStatus::Failed => Outcome::Failed(LedgerError::InvalidPriorState {
            provider_ref: reference.to_string(),
            status: referenced.status,
        }),
        TransactionStatus::Finalized | TransactionStatus::Compensated => {
            Outcome::Failed(LedgerError::AlreadyFinalized(reference.to_string()))
        }
    };
    Ok(Err(outcome))
}

async fn call_wallet(
    wallet: &dyn WalletGateway,
    direction: Direction,
    tx: &Transaction,
    bet_ref: &str,
) -> Outcome {
    let op = WalletOperation {
        player_id: tx.player_id,
        currency: tx.currency.clone(),
        amount: tx.amount,
        bet_ref: bet_ref.to_string(),
        reference: tx.id.to_string(),
    };

    let (label, result) = match direction {
        Direction::Debit => ("debit", wallet.debit(&op).await),
        Direction::Credit => ("credit", wallet.credit(&op).await),
    };
    metrics::wallet_call(label, result.is_ok());

    match result {
        Ok(balance) => Outcome::Applied(Applied {
            new_balance: Some(balance),
            referenced: None,
        }),
        Err(e) => {
            let err = LedgerError::from_gateway(e);
            if err.is_deferral() {
                Outcome::Deferred(err)
            } else {
                Outcome::Failed(err)
            }
        }
    }
}

/// Issue the wallet call for a claimed transaction.
///
/// Zero-amount settles and reversals skip the wallet entirely.
pub(crate) async fn apply(
    store: &dyn TransactionStore,
    wallet: &dyn WalletGateway,
    tx: &Transaction,
) -> LedgerResult<Outcome> {
    if tx.kind == TransactionKind::Withdraw {
        return Ok(call_wallet(wallet, Direction::Debit, tx, &tx.provider_ref).await);
    }

    let referenced = match usable_reference(store, tx).await? {
        Ok(referenced) => referenced,
        Err(outcome) => return Ok(outcome),
    };

    let direction = match (tx.kind, referenced.kind) {
        (TransactionKind::Cancel, TransactionKind::Deposit) => Direction::Debit,
        _ => Direction::Credit,
    };

    if tx.amount.is_zero() {
        return Ok(Outcome::Applied(Applied {
            new_balance: None,
            referenced: Some(referenced),
        }));
    }

    let bet_ref = tx
        .reversal_of_provider_ref
        .as_deref()
        .unwrap_or(&tx.provider_ref);
    Ok(match call_wallet(wallet, direction, tx, bet_ref).await {
        Outcome::Applied(applied) => Outcome::Applied(Applied {
            referenced: Some(referenced),
            ..applied
        }),
        other => other,
    })
}

/// Claim timestamp of a transaction this caller holds
fn claim_of(tx: &Transaction) -> Option<DateTime<Utc>> {
    let claimed_at = tx.claimed_at;
    if claimed_at.is_none() {
        log::error!("Transaction {} is {} without a claim", tx.id, tx.status);
    }
    claimed_at
}

fn log_lost_claim(tx: &Transaction, action: &str) {
    log::error!(
        "Transaction {}: claim lost before it could be {}, leaving the stored row as is",
        tx.id,
        action
    );
}

/// Persist a successful application.
///
/// The referenced transaction is closed out in the same store write that
/// confirms this one, and only while this caller still holds the claim.
/// Returns `false` when the claim was lost; `tx` is then left untouched.
pub(crate) async fn confirm(
    store: &dyn TransactionStore,
    tx: &mut Transaction,
    referenced: Option<Transaction>,
) -> LedgerResult<bool> {
    let Some(claimed_at) = claim_of(tx) else {
        return Ok(false);
    };

    let closed = match referenced {
        Some(referenced) => {
            let closed_status = match tx.kind {
                TransactionKind::Cancel => TransactionStatus::Compensated,
                _ => TransactionStatus::Finalized,
            };
            // Re-read so the side effect lands on the latest version
            let mut latest = store
                .get_by_id(referenced.id)
                .await?
                .unwrap_or(referenced);
            match latest.transition(closed_status) {
                Ok(()) => Some(latest),
                Err(e) => {
                    log::error!(
                        "Transaction {}: could not mark referenced {} as {}: {}",
                        tx.id,
                        latest.provider_ref,
                        closed_status,
                        e
                    );
                    None
                }
            }
        }
        None => None,
    };

    let mut confirmed = tx.clone();
    confirmed.transition(TransactionStatus::Confirmed)?;
    if !store
        .complete_claim(&confirmed, claimed_at, closed.as_ref())
        .await?
    {
        log_lost_claim(tx, "confirmed");
        return Ok(false);
    }
    *tx = confirmed;
    Ok(true)
}

/// Move a claimed transaction to `next` if the claim is still held
async fn finish(
    store: &dyn TransactionStore,
    tx: &mut Transaction,
    next: TransactionStatus,
    action: &str,
) -> LedgerResult<bool> {
    let Some(claimed_at) = claim_of(tx) else {
        return Ok(false);
    };
    let mut updated = tx.clone();
    updated.transition(next)?;
    if !store.update_claimed(&updated, claimed_at).await? {
        log_lost_claim(tx, action);
        return Ok(false);
    }
    *tx = updated;
    Ok(true)
}

/// Return a claimed transaction to pending, logging instead of failing.
///
/// Returns `false` when the transaction was not released.
pub(crate) async fn release(store: &dyn TransactionStore, tx: &mut Transaction) -> bool {
    match finish(store, tx, TransactionStatus::Pending, "released").await {
        Ok(released) => released,
        Err(e) => {
            log::error!("Transaction {}: failed to release claim: {}", tx.id, e);
            false
        }
    }
}

/// Mark a claimed transaction failed; `false` when the claim was lost
pub(crate) async fn fail(store: &dyn TransactionStore, tx: &mut Transaction) -> LedgerResult<bool> {
    finish(store, tx, TransactionStatus::Failed, "failed").await
}

/// Count one more worker attempt on a claimed transaction.
///
/// Returns `false` when the claim was lost, in which case no wallet call may follow.
pub(crate) async fn record_attempt(
    store: &dyn TransactionStore,
    tx: &mut Transaction,
) -> LedgerResult<bool> {
    let Some(claimed_at) = claim_of(tx) else {
        return Ok(false);
    };
    let mut updated = tx.clone();
    updated.attempts += 1;
    updated.updated_at = Utc::now();
    if !store.update_claimed(&updated, claimed_at).await? {
        log_lost_claim(tx, "retried");
        return Ok(false);
    }
    *tx = updated;
    Ok(true)
}
