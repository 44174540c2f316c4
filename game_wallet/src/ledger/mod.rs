//! Transaction ledger: the entity, its state machine and error taxonomy.
//!
//! Every bet, settle and cancel requested by the game provider is recorded
//! as a [`Transaction`] before any wallet call is made. Records are never
//! deleted; they form the audit trail of what was asked and what happened.
//!
//! ## State machine
//!
//! ```text
//! Pending ──claim──▶ Processing ──▶ Confirmed ──▶ Finalized | Compensated
//!    │                   │  │
//!    │                   │  └──▶ Failed
//!    └──exhausted──▶ Failed ◀┘
//!                    Processing ──retry later──▶ Pending
//! ```

pub mod errors;
pub mod guard;
pub mod models;

pub use errors::{LedgerError, LedgerResult};
pub use models::{
    CANCEL_REF_PREFIX, OperationResult, PlayerId, Transaction, TransactionKind,
    TransactionStatus, cancel_ref,
};
