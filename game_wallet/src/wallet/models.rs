//! Wallet gateway data models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::PlayerId;

/// Player balance as reported by the wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub balance: Decimal,
    pub currency: String,
}

/// A single debit or credit against a player's wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletOperation {
    pub player_id: PlayerId,
    pub currency: String,
    pub amount: Decimal,
    /// Provider reference of the bet this operation concerns
    pub bet_ref: String,
    /// Ledger transaction ID, used by the wallet for idempotency
    pub reference: String,
}

/// Request body of the wallet's withdraw and deposit endpoints
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OperationRequest {
    pub user_id: PlayerId,
    pub currency: String,
    pub transactions: Vec<OperationRequestEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OperationRequestEntry {
    pub amount: Decimal,
    pub bet_id: String,
    pub reference: String,
}

impl From<&WalletOperation> for OperationRequest {
    fn from(op: &WalletOperation) -> Self {
        Self {
            user_id: op.player_id,
            currency: op.currency.clone(),
            transactions: vec![OperationRequestEntry {
                amount: op.amount,
                bet_id: op.bet_ref.clone(),
                reference: op.reference.clone(),
            }],
        }
    }
}

/// Response body of the withdraw and deposit endpoints
#[derive(Debug, Deserialize)]
pub(crate) struct OperationResponse {
    pub balance: Decimal,
}

/// Error body returned by the wallet on non-2xx responses
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub code: String,
    #[serde(default)]
    pub msg: String,
}
