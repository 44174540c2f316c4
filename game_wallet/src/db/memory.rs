//! In-process transaction store.
//!
//! Every operation runs inside one mutex critical section, which gives the
//! claim operations the same all-or-nothing behaviour as the conditional
//! updates of the PostgreSQL store. Used by tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{
    errors::{StoreError, StoreResult},
    repository::{ClaimCriteria, TransactionStore},
};
use crate::ledger::{PlayerId, Transaction, TransactionStatus};

/// In-memory implementation of `TransactionStore`
#[derive(Clone, Default)]
pub struct MemoryTransactionStore {
    rows: Arc<Mutex<Vec<Transaction>>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored transaction, in insertion order
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.rows().clone()
    }

    fn rows(&self) -> MutexGuard<'_, Vec<Transaction>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn has_processing(rows: &[Transaction], player_id: PlayerId) -> bool {
    rows.iter()
        .any(|t| t.player_id == player_id && t.status == TransactionStatus::Processing)
}

/// The row with `id`, if it is still processing under the claim taken at `claimed_at`
fn claimed_row(
    rows: &mut [Transaction],
    id: Uuid,
    claimed_at: DateTime<Utc>,
) -> Option<&mut Transaction> {
    rows.iter_mut().find(|t| {
        t.id == id && t.status == TransactionStatus::Processing && t.claimed_at == Some(claimed_at)
    })
}

fn write_back(row: &mut Transaction, tx: &Transaction) {
    row.status = tx.status;
    row.attempts = tx.attempts;
    row.claimed_at = tx.claimed_at;
    row.updated_at = tx.updated_at;
}

fn claim(row: &mut Transaction, now: DateTime<Utc>) -> Transaction {
    row.status = TransactionStatus::Processing;
    row.claimed_at = Some(now);
    row.updated_at = now;
    row.clone()
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn create_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        let mut rows = self.rows();
        if rows.iter().any(|t| t.provider_ref == tx.provider_ref) {
            return Err(StoreError::DuplicateProviderRef(tx.provider_ref.clone()));
        }
        rows.push(tx.clone());
        Ok(())
    }

    async fn get_by_provider_ref(&self, provider_ref: &str) -> StoreResult<Option<Transaction>> {
        Ok(self
            .rows()
            .iter()
            .find(|t| t.provider_ref == provider_ref)
            .cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        Ok(self.rows().iter().find(|t| t.id == id).cloned())
    }

    async fn update_claimed(
        &self,
        tx: &Transaction,
        claimed_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut rows = self.rows();
        let Some(row) = claimed_row(&mut rows, tx.id, claimed_at) else {
            return Ok(false);
        };
        write_back(row, tx);
        Ok(true)
    }

    async fn complete_claim(
        &self,
        tx: &Transaction,
        claimed_at: DateTime<Utc>,
        closed: Option<&Transaction>,
    ) -> StoreResult<bool> {
        let mut rows = self.rows();
        let Some(row) = claimed_row(&mut rows, tx.id, claimed_at) else {
            return Ok(false);
        };
        write_back(row, tx);

        if let Some(closed) = closed {
            match rows
                .iter_mut()
                .find(|t| t.id == closed.id && t.status == TransactionStatus::Confirmed)
            {
                Some(row) => {
                    row.status = closed.status;
                    row.updated_at = closed.updated_at;
                }
                None => log::error!(
                    "Transaction {}: referenced {} was no longer confirmed when closing it as {}",
                    tx.id,
                    closed.provider_ref,
                    closed.status
                ),
            }
        }
        Ok(true)
    }

    async fn claim_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let mut rows = self.rows();
        let Some(idx) = rows.iter().position(|t| t.id == id) else {
            return Ok(None);
        };
        if rows[idx].status != TransactionStatus::Pending
            || has_processing(&rows, rows[idx].player_id)
        {
            return Ok(None);
        }
        Ok(Some(claim(&mut rows[idx], Utc::now())))
    }

    async fn claim_next_processable(
        &self,
        criteria: &ClaimCriteria,
    ) -> StoreResult<Option<Transaction>> {
        let mut rows = self.rows();
        let candidate = rows
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                t.status == TransactionStatus::Pending
                    && t.attempts < criteria.max_attempts
                    && !criteria.exclude_players.contains(&t.player_id)
                    && !has_processing(&rows, t.player_id)
            })
            .min_by_key(|(_, t)| t.created_at)
            .map(|(idx, _)| idx);

        Ok(candidate.map(|idx| claim(&mut rows[idx], Utc::now())))
    }

    async fn count_processing(&self, player_id: PlayerId) -> StoreResult<i64> {
        Ok(self
            .rows()
            .iter()
            .filter(|t| t.player_id == player_id && t.status == TransactionStatus::Processing)
            .count() as i64)
    }

    async fn has_open_transactions(
        &self,
        player_id: PlayerId,
        exclude: Uuid,
    ) -> StoreResult<bool> {
        Ok(self
            .rows()
            .iter()
            .any(|t| t.player_id == player_id && t.id != exclude && t.status.is_open()))
    }

    async fn release_stale_claims(
        &self,
        older_than: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>> {
        let now = Utc::now();
        let mut released = Vec::new();
        for row in self.rows().iter_mut() {
            let stale = row.status == TransactionStatus::Processing
                && row.claimed_at.is_some_and(|at| at < older_than);
            if stale {
                row.status = TransactionStatus::Pending;
                row.claimed_at = None;
                row.updated_at = now;
                released.push(row.clone());
            }
        }
        Ok(released)
    }

    async fn fail_exhausted(&self, max_attempts: u32) -> StoreResult<Vec<Transaction>> {
        let now = Utc::now();
        let mut failed = Vec::new();
        for row in self.rows().iter_mut() {
            if row.status == TransactionStatus::Pending && row.attempts >= max_attempts {
                row.status = TransactionStatus::Failed;
                row.updated_at = now;
                failed.push(row.clone());
            }
        }
        Ok(failed)
    }
}
