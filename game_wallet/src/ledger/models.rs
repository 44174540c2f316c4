//! Ledger data models and the transaction state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{LedgerError, LedgerResult};

/// Player ID type
pub type PlayerId = i64;

/// Prefix of the provider reference derived for cancel transactions
pub const CANCEL_REF_PREFIX: &str = "cancel:";

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Bet (wallet debit)
    Withdraw,
    /// Settle (wallet credit)
    Deposit,
    /// Reversal of a prior withdraw or deposit
    Cancel,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Withdraw => write!(f, "withdraw"),
            TransactionKind::Deposit => write!(f, "deposit"),
            TransactionKind::Cancel => write!(f, "cancel"),
        }
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "withdraw" => Ok(TransactionKind::Withdraw),
            "deposit" => Ok(TransactionKind::Deposit),
            "cancel" => Ok(TransactionKind::Cancel),
            other => Err(format!("unknown transaction kind '{other}'")),
        }
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Confirmed,
    Failed,
    Finalized,
    Compensated,
}

impl TransactionStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [TransactionStatus; 6] = [
        TransactionStatus::Pending,
        TransactionStatus::Processing,
        TransactionStatus::Confirmed,
        TransactionStatus::Failed,
        TransactionStatus::Finalized,
        TransactionStatus::Compensated,
    ];

    /// Whether `next` is a legal successor of this status.
    ///
    /// `Confirmed` is terminal for reconciliation purposes but a confirmed
    /// bet or settle can still be closed out or reversed.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Confirmed)
                | (Processing, Failed)
                | (Processing, Pending)
                | (Confirmed, Finalized)
                | (Confirmed, Compensated)
        )
    }

    /// No further wallet attempts are made for a transaction in this status
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Confirmed
                | TransactionStatus::Failed
                | TransactionStatus::Finalized
                | TransactionStatus::Compensated
        )
    }

    /// Pending or processing
    pub fn is_open(self) -> bool {
        matches!(
            self,
            TransactionStatus::Pending | TransactionStatus::Processing
        )
    }

    /// Closed out or reversed
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            TransactionStatus::Finalized | TransactionStatus::Compensated
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Processing => write!(f, "processing"),
            TransactionStatus::Confirmed => write!(f, "confirmed"),
            TransactionStatus::Failed => write!(f, "failed"),
            TransactionStatus::Finalized => write!(f, "finalized"),
            TransactionStatus::Compensated => write!(f, "compensated"),
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "processing" => Ok(TransactionStatus::Processing),
            "confirmed" => Ok(TransactionStatus::Confirmed),
            "failed" => Ok(TransactionStatus::Failed),
            "finalized" => Ok(TransactionStatus::Finalized),
            "compensated" => Ok(TransactionStatus::Compensated),
            other => Err(format!("unknown transaction status '{other}'")),
        }
    }
}

/// Ledger transaction model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub player_id: PlayerId,
    pub provider_ref: String,
    pub reversal_of_provider_ref: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub attempts: u32,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    fn new(
        player_id: PlayerId,
        provider_ref: String,
        reversal_of_provider_ref: Option<String>,
        amount: Decimal,
        currency: String,
        kind: TransactionKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            player_id,
            provider_ref,
            reversal_of_provider_ref,
            amount,
            currency,
            kind,
            status: TransactionStatus::Pending,
            attempts: 0,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// New pending bet
    pub fn withdraw(
        player_id: PlayerId,
        provider_ref: impl Into<String>,
        amount: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self::new(
            player_id,
            provider_ref.into(),
            None,
            amount,
            currency.into(),
            TransactionKind::Withdraw,
        )
    }

    /// New pending settle of the bet identified by `bet_ref`
    pub fn deposit(
        player_id: PlayerId,
        provider_ref: impl Into<String>,
        bet_ref: impl Into<String>,
        amount: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self::new(
            player_id,
            provider_ref.into(),
            Some(bet_ref.into()),
            amount,
            currency.into(),
            TransactionKind::Deposit,
        )
    }

    /// New pending reversal of `original`, carrying its amount and currency
    pub fn cancel_of(original: &Transaction) -> Self {
        Self::new(
            original.player_id,
            cancel_ref(&original.provider_ref),
            Some(original.provider_ref.clone()),
            original.amount,
            original.currency.clone(),
            TransactionKind::Cancel,
        )
    }

    /// Move to `next`, refreshing `updated_at`.
    ///
    /// Leaving `Processing` clears the claim timestamp.
    pub fn transition(&mut self, next: TransactionStatus) -> LedgerResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        if next == TransactionStatus::Processing {
            self.claimed_at = Some(now);
        } else {
            self.claimed_at = None;
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

/// Provider reference under which the cancel of `provider_ref` is recorded
pub fn cancel_ref(provider_ref: &str) -> String {
    format!("{CANCEL_REF_PREFIX}{provider_ref}")
}

/// Result of a bet, settle or cancel request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub transaction_id: Uuid,
    pub provider_ref: String,
    pub old_balance: Option<Decimal>,
    pub new_balance: Option<Decimal>,
    pub status: TransactionStatus,
}
