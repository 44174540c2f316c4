//! Transaction store trait and its PostgreSQL implementation.
//!
//! The orchestrator and the reconciliation worker only ever see
//! `dyn TransactionStore`, so the store can be swapped for the in-memory
//! implementation in tests.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{
    errors::{StoreError, StoreResult},
    timeouts::{CLAIM_TIMEOUT, with_default_timeout, with_timeout},
};
use crate::ledger::{PlayerId, Transaction, TransactionKind, TransactionStatus};

/// Unique index on `provider_ref`
const PROVIDER_REF_CONSTRAINT: &str = "transactions_provider_ref_key";

/// Partial unique index allowing one processing row per player
const ONE_PROCESSING_CONSTRAINT: &str = "transactions_one_processing_per_player";

/// Attempts at `claim_next_processable` when racing another claimer
const CLAIM_CONFLICT_RETRIES: usize = 3;

/// Outcome write on a claimed row, guarded by the claim timestamp
const UPDATE_CLAIMED: &str = r#"
    UPDATE transactions
    SET status = $2, attempts = $3, claimed_at = $4, updated_at = $5
    WHERE id = $1 AND status = 'processing' AND claimed_at = $6
"#;

const COLUMNS: &str = "id, player_id, provider_ref, reversal_of_provider_ref, amount, currency, \
                       kind, status, attempts, claimed_at, created_at, updated_at";

/// Selection rules for [`TransactionStore::claim_next_processable`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimCriteria {
    /// Only transactions with fewer attempts are eligible
    pub max_attempts: u32,
    /// Players whose transactions are skipped
    pub exclude_players: Vec<PlayerId>,
}

/// Durable store of ledger transactions
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a new transaction
    ///
    /// Fails with `StoreError::DuplicateProviderRef` when the provider
    /// reference is already recorded.
    async fn create_transaction(&self, tx: &Transaction) -> StoreResult<()>;

    /// Find a transaction by provider reference
    async fn get_by_provider_ref(&self, provider_ref: &str) -> StoreResult<Option<Transaction>>;

    /// Find a transaction by ID
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Transaction>>;

    /// Write back a transaction claimed at `claimed_at`.
    ///
    /// Lands only while the row is still processing under that same claim.
    /// Returns `false`, writing nothing, once the claim was released or
    /// taken over by another claimer.
    async fn update_claimed(&self, tx: &Transaction, claimed_at: DateTime<Utc>)
    -> StoreResult<bool>;

    /// Confirm a claimed transaction and close the transaction it references.
    ///
    /// Both writes commit together, and only while the claim taken at
    /// `claimed_at` is still held. Returns `false`, writing nothing, otherwise.
    async fn complete_claim(
        &self,
        tx: &Transaction,
        claimed_at: DateTime<Utc>,
        closed: Option<&Transaction>,
    ) -> StoreResult<bool>;

    /// Atomically move one pending transaction to processing.
    ///
    /// Returns `None` if the transaction is not pending or its player
    /// already has a processing transaction.
    async fn claim_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>>;

    /// Atomically select the oldest processable transaction and claim it
    async fn claim_next_processable(
        &self,
        criteria: &ClaimCriteria,
    ) -> StoreResult<Option<Transaction>>;

    /// Number of processing transactions for a player
    async fn count_processing(&self, player_id: PlayerId) -> StoreResult<i64>;

    /// Whether the player has a pending or processing transaction other than `exclude`
    async fn has_open_transactions(&self, player_id: PlayerId, exclude: Uuid)
    -> StoreResult<bool>;

    /// Return processing transactions claimed before `older_than` to pending
    async fn release_stale_claims(
        &self,
        older_than: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>>;

    /// Mark pending transactions with `attempts >= max_attempts` as failed
    async fn fail_exhausted(&self, max_attempts: u32) -> StoreResult<Vec<Transaction>>;
}

/// PostgreSQL implementation of `TransactionStore`
#[derive(Clone)]
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn complete_claim_in_tx(
        &self,
        tx: &Transaction,
        claimed_at: DateTime<Utc>,
        closed: Option<&Transaction>,
    ) -> Result<bool, sqlx::Error> {
        let mut db_tx = self.pool.begin().await?;

        let result = sqlx::query(UPDATE_CLAIMED)
            .bind(tx.id)
            .bind(tx.status.to_string())
            .bind(tx.attempts as i32)
            .bind(tx.claimed_at.map(|dt| dt.naive_utc()))
            .bind(tx.updated_at.naive_utc())
            .bind(claimed_at.naive_utc())
            .execute(&mut *db_tx)
            .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls it back
            return Ok(false);
        }

        if let Some(closed) = closed {
            let result = sqlx::query(
                r#"
                UPDATE transactions
                SET status = $2, updated_at = $3
                WHERE id = $1 AND status = 'confirmed'
                "#,
            )
            .bind(closed.id)
            .bind(closed.status.to_string())
            .bind(closed.updated_at.naive_utc())
            .execute(&mut *db_tx)
            .await?;

            if result.rows_affected() == 0 {
                log::error!(
                    "Transaction {}: referenced {} was no longer confirmed when closing it as {}",
                    tx.id,
                    closed.provider_ref,
                    closed.status
                );
            }
        }

        db_tx.commit().await?;
        Ok(true)
    }
}

fn constraint_violated(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => db.constraint() == Some(constraint),
        _ => false,
    }
}

fn row_to_transaction(row: &PgRow) -> StoreResult<Transaction> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let attempts: i32 = row.try_get("attempts")?;

    Ok(Transaction {
        id: row.try_get("id")?,
        player_id: row.try_get("player_id")?,
        provider_ref: row.try_get("provider_ref")?,
        reversal_of_provider_ref: row.try_get("reversal_of_provider_ref")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        kind: kind.parse::<TransactionKind>().map_err(StoreError::Corrupt)?,
        status: status
            .parse::<TransactionStatus>()
            .map_err(StoreError::Corrupt)?,
        attempts: u32::try_from(attempts)
            .map_err(|_| StoreError::Corrupt(format!("negative attempts {attempts}")))?,
        claimed_at: row
            .try_get::<Option<chrono::NaiveDateTime>, _>("claimed_at")?
            .map(|dt| dt.and_utc()),
        created_at: row
            .try_get::<chrono::NaiveDateTime, _>("created_at")?
            .and_utc(),
        updated_at: row
            .try_get::<chrono::NaiveDateTime, _>("updated_at")?
            .and_utc(),
    })
}

fn rows_to_transactions(rows: &[PgRow]) -> StoreResult<Vec<Transaction>> {
    rows.iter().map(row_to_transaction).collect()
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn create_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        let result = with_default_timeout(
            sqlx::query(
                r#"
                INSERT INTO transactions (id, player_id, provider_ref, reversal_of_provider_ref, amount,
                                          currency, kind, status, attempts, claimed_at, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(tx.id)
            .bind(tx.player_id)
            .bind(&tx.provider_ref)
            .bind(&tx.reversal_of_provider_ref)
            .bind(tx.amount)
            .bind(&tx.currency)
            .bind(tx.kind.to_string())
            .bind(tx.status.to_string())
            .bind(tx.attempts as i32)
            .bind(tx.claimed_at.map(|dt| dt.naive_utc()))
            .bind(tx.created_at.naive_utc())
            .bind(tx.updated_at.naive_utc())
            .execute(&self.pool),
        )
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(StoreError::Database(e)) if constraint_violated(&e, PROVIDER_REF_CONSTRAINT) => {
                Err(StoreError::DuplicateProviderRef(tx.provider_ref.clone()))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_by_provider_ref(&self, provider_ref: &str) -> StoreResult<Option<Transaction>> {
        let row = with_default_timeout(
            sqlx::query(&format!(
                "SELECT {COLUMNS} FROM transactions WHERE provider_ref = $1"
            ))
            .bind(provider_ref)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let row = with_default_timeout(
            sqlx::query(&format!("SELECT {COLUMNS} FROM transactions WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    async fn update_claimed(
        &self,
        tx: &Transaction,
        claimed_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = with_default_timeout(
            sqlx::query(UPDATE_CLAIMED)
                .bind(tx.id)
                .bind(tx.status.to_string())
                .bind(tx.attempts as i32)
                .bind(tx.claimed_at.map(|dt| dt.naive_utc()))
                .bind(tx.updated_at.naive_utc())
                .bind(claimed_at.naive_utc())
                .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_claim(
        &self,
        tx: &Transaction,
        claimed_at: DateTime<Utc>,
        closed: Option<&Transaction>,
    ) -> StoreResult<bool> {
        with_default_timeout(self.complete_claim_in_tx(tx, claimed_at, closed)).await
    }

    async fn claim_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let now = Utc::now().naive_utc();
        let result = with_timeout(
            CLAIM_TIMEOUT,
            sqlx::query(&format!(
                r#"
                UPDATE transactions t
                SET status = 'processing', claimed_at = $2, updated_at = $2
                WHERE t.id = $1
                  AND t.status = 'pending'
                  AND NOT EXISTS (
                      SELECT 1 FROM transactions p
                      WHERE p.player_id = t.player_id AND p.status = 'processing'
                  )
                RETURNING {COLUMNS}
                "#
            ))
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool),
        )
        .await;

        match result {
            Ok(row) => row.as_ref().map(row_to_transaction).transpose(),
            // Another claim for the same player committed first
            Err(StoreError::Database(e)) if constraint_violated(&e, ONE_PROCESSING_CONSTRAINT) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn claim_next_processable(
        &self,
        criteria: &ClaimCriteria,
    ) -> StoreResult<Option<Transaction>> {
        for _ in 0..CLAIM_CONFLICT_RETRIES {
            let now = Utc::now().naive_utc();
            let result = with_timeout(
                CLAIM_TIMEOUT,
                sqlx::query(&format!(
                    r#"
                    UPDATE transactions
                    SET status = 'processing', claimed_at = $3, updated_at = $3
                    WHERE id = (
                        SELECT t.id FROM transactions t
                        WHERE t.status = 'pending'
                          AND t.attempts < $1
                          AND NOT (t.player_id = ANY($2))
                          AND NOT EXISTS (
                              SELECT 1 FROM transactions p
                              WHERE p.player_id = t.player_id AND p.status = 'processing'
                          )
                        ORDER BY t.created_at ASC
                        LIMIT 1
                        FOR UPDATE SKIP LOCKED
                    )
                    AND status = 'pending'
                    RETURNING {COLUMNS}
                    "#
                ))
                .bind(criteria.max_attempts as i32)
                .bind(&criteria.exclude_players)
                .bind(now)
                .fetch_optional(&self.pool),
            )
            .await;

            match result {
                Ok(row) => return row.as_ref().map(row_to_transaction).transpose(),
                // Lost a race for that player; the next candidate may still be free
                Err(StoreError::Database(e))
                    if constraint_violated(&e, ONE_PROCESSING_CONSTRAINT) =>
                {
                    log::debug!("Claim conflicted with a concurrent claim, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn count_processing(&self, player_id: PlayerId) -> StoreResult<i64> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT COUNT(*) AS n FROM transactions WHERE player_id = $1 AND status = 'processing'",
            )
            .bind(player_id)
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(row.try_get("n")?)
    }

    async fn has_open_transactions(
        &self,
        player_id: PlayerId,
        exclude: Uuid,
    ) -> StoreResult<bool> {
        let row = with_default_timeout(
            sqlx::query(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM transactions
                    WHERE player_id = $1 AND id <> $2 AND status IN ('pending', 'processing')
                ) AS open
                "#,
            )
            .bind(player_id)
            .bind(exclude)
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(row.try_get("open")?)
    }

    async fn release_stale_claims(
        &self,
        older_than: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = with_default_timeout(
            sqlx::query(&format!(
                r#"
                UPDATE transactions
                SET status = 'pending', claimed_at = NULL, updated_at = $2
                WHERE status = 'processing' AND claimed_at < $1
                RETURNING {COLUMNS}
                "#
            ))
            .bind(older_than.naive_utc())
            .bind(Utc::now().naive_utc())
            .fetch_all(&self.pool),
        )
        .await?;

        rows_to_transactions(&rows)
    }

    async fn fail_exhausted(&self, max_attempts: u32) -> StoreResult<Vec<Transaction>> {
        let rows = with_default_timeout(
            sqlx::query(&format!(
                r#"
                UPDATE transactions
                SET status = 'failed', updated_at = $2
                WHERE status = 'pending' AND attempts >= $1
                RETURNING {COLUMNS}
                "#
            ))
            .bind(max_attempts as i32)
            .bind(Utc::now().naive_utc())
            .fetch_all(&self.pool),
        )
        .await?;

        rows_to_transactions(&rows)
    }
}
