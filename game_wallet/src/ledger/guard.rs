//! Duplicate guard for provider references.

use super::errors::{LedgerError, LedgerResult};
use crate::db::{StoreError, TransactionStore};

/// Reject a request whose provider reference has already been recorded.
///
/// Nothing is replayed: the caller gets `DuplicateOperation` and no wallet
/// call may follow.
pub async fn ensure_unique(store: &dyn TransactionStore, provider_ref: &str) -> LedgerResult<()> {
    if store.get_by_provider_ref(provider_ref).await?.is_some() {
        log::info!("Rejecting duplicate provider reference {provider_ref}");
        return Err(LedgerError::DuplicateOperation(provider_ref.to_string()));
    }
    Ok(())
}

/// Map a store insert conflict from a lost race to `DuplicateOperation`
pub fn map_insert_conflict(err: StoreError) -> LedgerError {
    match err {
        StoreError::DuplicateProviderRef(provider_ref) => {
            LedgerError::DuplicateOperation(provider_ref)
        }
        other => LedgerError::Store(other),
    }
}
