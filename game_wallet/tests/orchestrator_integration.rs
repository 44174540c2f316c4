//! Integration tests for the bet, settle and cancel operations.
//!
//! Runs the orchestrator against the in-memory store and a scripted wallet.

mod common;

use async_trait::async_trait;
use common::{Call, FakeWallet, WalletMode, harness, test_config};
use game_wallet::{
    LedgerError, Orchestrator, PlayerId, TransactionKind, TransactionStatus,
    db::{MemoryTransactionStore, TransactionStore},
    wallet::{Balance, GatewayResult, WalletGateway, WalletOperation},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

const PLAYER: PlayerId = 1;

#[tokio::test]
async fn test_bet_confirmed_when_wallet_up() {
    let h = harness();
    h.wallet.set_balance(PLAYER, dec!(500));

    let result = h
        .orchestrator
        .place_bet(PLAYER, "b1", dec!(100), "USD")
        .await
        .expect("Bet should succeed");

    assert_eq!(result.status, TransactionStatus::Confirmed);
    assert_eq!(result.provider_ref, "b1");
    assert_eq!(result.old_balance, Some(dec!(500)));
    assert_eq!(result.new_balance, Some(dec!(400)));

    let calls = h.wallet.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].call, Call::Debit);
    assert_eq!(calls[0].op.amount, dec!(100));
    assert_eq!(calls[0].op.currency, "USD");
    assert_eq!(calls[0].op.bet_ref, "b1");
    assert_eq!(calls[0].op.reference, result.transaction_id.to_string());

    let stored = h.store.snapshot();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, TransactionStatus::Confirmed);
    assert_eq!(stored[0].attempts, 0);
    assert!(stored[0].claimed_at.is_none());
}

#[tokio::test]
async fn test_duplicate_bet_rejected_without_wallet_call() {
    let h = harness();

    h.orchestrator
        .place_bet(PLAYER, "b1", dec!(100), "USD")
        .await
        .unwrap();
    let err = h
        .orchestrator
        .place_bet(PLAYER, "b1", dec!(100), "USD")
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::DuplicateOperation(ref r) if r == "b1"));
    assert_eq!(h.store.snapshot().len(), 1);
    assert_eq!(h.wallet.calls().len(), 1);
}

#[tokio::test]
async fn test_provider_ref_unique_across_players() {
    let h = harness();

    h.orchestrator
        .place_bet(1, "shared", dec!(5), "USD")
        .await
        .unwrap();
    let err = h
        .orchestrator
        .place_bet(2, "shared", dec!(5), "USD")
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::DuplicateOperation(_)));
}

#[tokio::test]
async fn test_bet_pending_when_wallet_down() {
    let h = harness();
    h.wallet.set_mode(WalletMode::Down);

    let result = h
        .orchestrator
        .place_bet(PLAYER, "b1", dec!(100), "USD")
        .await
        .expect("A wallet outage is not an error");

    assert_eq!(result.status, TransactionStatus::Pending);
    assert_eq!(result.old_balance, None);
    assert!(h.wallet.calls().is_empty());

    let stored = h.store.snapshot();
    assert_eq!(stored[0].status, TransactionStatus::Pending);
    assert_eq!(stored[0].attempts, 0);
}

#[tokio::test]
async fn test_balance_read_failure_defers_before_debit() {
    let h = harness();
    h.wallet.set_balance_down(true);

    let result = h
        .orchestrator
        .place_bet(PLAYER, "b1", dec!(10), "USD")
        .await
        .unwrap();

    assert_eq!(result.status, TransactionStatus::Pending);
    assert!(h.wallet.calls().is_empty());
    assert_eq!(
        h.store.count_processing(PLAYER).await.unwrap(),
        0,
        "Claim must be released"
    );
}

#[tokio::test]
async fn test_rejected_bet_fails_and_surfaces_error() {
    let h = harness();
    h.wallet.set_balance(PLAYER, dec!(5));
    h.wallet.set_mode(WalletMode::Rejecting);

    let err = h
        .orchestrator
        .place_bet(PLAYER, "b1", dec!(100), "USD")
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::WalletRejected(_)));
    assert_eq!(h.store.snapshot()[0].status, TransactionStatus::Failed);
    assert_eq!(h.wallet.balance(PLAYER), dec!(5));
}

#[tokio::test]
async fn test_unreadable_debit_reply_is_never_repeated() {
    let h = harness();
    h.wallet.set_balance(PLAYER, dec!(200));
    h.wallet.set_mode(WalletMode::Garbled);

    let err = h
        .orchestrator
        .place_bet(PLAYER, "b1", dec!(100), "USD")
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::WalletRejected(_)));
    assert_eq!(err.client_message(), "Wallet outcome unknown");
    assert_eq!(h.store.snapshot()[0].status, TransactionStatus::Failed);

    // The debit landed once; the worker must not send it again
    h.wallet.set_mode(WalletMode::Up);
    let summary = h.worker.tick().await;

    assert_eq!(summary.processed(), 0);
    assert_eq!(h.wallet.calls().len(), 1);
    assert_eq!(h.wallet.balance(PLAYER), dec!(100));
}

#[tokio::test]
async fn test_lost_bet_settle_finalizes_without_credit() {
    let h = harness();
    h.wallet.set_balance(PLAYER, dec!(500));
    h.orchestrator
        .place_bet(PLAYER, "b1", dec!(100), "USD")
        .await
        .unwrap();

    let result = h
        .orchestrator
        .settle(PLAYER, "s1", "b1", Decimal::ZERO, "USD")
        .await
        .expect("Settle should succeed");

    assert_eq!(result.status, TransactionStatus::Confirmed);
    assert_eq!(result.old_balance, Some(dec!(400)));
    assert_eq!(result.new_balance, Some(dec!(400)));
    assert!(h.wallet.calls().iter().all(|c| c.call == Call::Debit));

    let bet = h.store.get_by_provider_ref("b1").await.unwrap().unwrap();
    assert_eq!(bet.status, TransactionStatus::Finalized);
}

#[tokio::test]
async fn test_winning_settle_credits_and_finalizes() {
    let h = harness();
    h.wallet.set_balance(PLAYER, dec!(500));
    h.orchestrator
        .place_bet(PLAYER, "b1", dec!(100), "USD")
        .await
        .unwrap();

    let result = h
        .orchestrator
        .settle(PLAYER, "s1", "b1", dec!(250), "USD")
        .await
        .unwrap();

    assert_eq!(result.new_balance, Some(dec!(650)));
    let credit = h.wallet.calls().pop().unwrap();
    assert_eq!(credit.call, Call::Credit);
    assert_eq!(credit.op.amount, dec!(250));
    assert_eq!(credit.op.bet_ref, "b1");

    let bet = h.store.get_by_provider_ref("b1").await.unwrap().unwrap();
    assert_eq!(bet.status, TransactionStatus::Finalized);

    // A settled bet cannot be settled or cancelled again
    let err = h
        .orchestrator
        .settle(PLAYER, "s2", "b1", dec!(1), "USD")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyFinalized(_)));
    let err = h.orchestrator.cancel(PLAYER, "b1").await.unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyFinalized(_)));
}

#[tokio::test]
async fn test_cancel_bet_credits_and_compensates() {
    let h = harness();
    h.wallet.set_balance(PLAYER, dec!(500));
    h.orchestrator
        .place_bet(PLAYER, "b1", dec!(100), "USD")
        .await
        .unwrap();

    let result = h
        .orchestrator
        .cancel(PLAYER, "b1")
        .await
        .expect("Cancel should succeed");

    assert_eq!(result.status, TransactionStatus::Confirmed);
    assert_eq!(result.provider_ref, "cancel:b1");
    assert_eq!(result.new_balance, Some(dec!(500)));

    let calls = h.wallet.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].call, Call::Credit);
    assert_eq!(calls[1].op.amount, dec!(100));

    let bet = h.store.get_by_provider_ref("b1").await.unwrap().unwrap();
    assert_eq!(bet.status, TransactionStatus::Compensated);
    let cancel = h
        .store
        .get_by_provider_ref("cancel:b1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancel.kind, TransactionKind::Cancel);
    assert_eq!(cancel.reversal_of_provider_ref.as_deref(), Some("b1"));
}

#[tokio::test]
async fn test_cancel_settle_debits_winnings() {
    let h = harness();
    h.wallet.set_balance(PLAYER, dec!(100));
    h.orchestrator
        .place_bet(PLAYER, "b1", dec!(10), "USD")
        .await
        .unwrap();
    h.orchestrator
        .settle(PLAYER, "s1", "b1", dec!(30), "USD")
        .await
        .unwrap();

    let result = h.orchestrator.cancel(PLAYER, "s1").await.unwrap();

    assert_eq!(result.status, TransactionStatus::Confirmed);
    assert_eq!(result.new_balance, Some(dec!(90)));
    let last = h.wallet.calls().pop().unwrap();
    assert_eq!(last.call, Call::Debit);
    assert_eq!(last.op.amount, dec!(30));

    let settle = h.store.get_by_provider_ref("s1").await.unwrap().unwrap();
    assert_eq!(settle.status, TransactionStatus::Compensated);
}

#[tokio::test]
async fn test_cancel_zero_settle_skips_wallet() {
    let h = harness();
    h.orchestrator
        .place_bet(PLAYER, "b1", dec!(10), "USD")
        .await
        .unwrap();
    h.orchestrator
        .settle(PLAYER, "s1", "b1", Decimal::ZERO, "USD")
        .await
        .unwrap();

    let result = h.orchestrator.cancel(PLAYER, "s1").await.unwrap();

    assert_eq!(result.status, TransactionStatus::Confirmed);
    assert_eq!(h.wallet.calls().len(), 1);
}

#[tokio::test]
async fn test_cancel_of_cancel_is_rejected() {
    let h = harness();
    h.orchestrator
        .place_bet(PLAYER, "b1", dec!(10), "USD")
        .await
        .unwrap();
    h.orchestrator.cancel(PLAYER, "b1").await.unwrap();

    let err = h.orchestrator.cancel(PLAYER, "cancel:b1").await.unwrap_err();
    assert!(matches!(err, LedgerError::NonReversibleOperation(_)));
}

#[tokio::test]
async fn test_second_pending_cancel_is_duplicate() {
    let h = harness();
    h.orchestrator
        .place_bet(PLAYER, "b1", dec!(10), "USD")
        .await
        .unwrap();
    h.wallet.set_mode(WalletMode::Down);

    let first = h.orchestrator.cancel(PLAYER, "b1").await.unwrap();
    assert_eq!(first.status, TransactionStatus::Pending);

    let err = h.orchestrator.cancel(PLAYER, "b1").await.unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateOperation(ref r) if r == "cancel:b1"));
}

#[tokio::test]
async fn test_reference_errors() {
    let h = harness();
    h.orchestrator
        .place_bet(PLAYER, "b1", dec!(10), "USD")
        .await
        .unwrap();

    let err = h
        .orchestrator
        .settle(PLAYER, "s1", "missing", dec!(1), "USD")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::ReferenceNotFound(_)));

    let err = h.orchestrator.cancel(PLAYER, "missing").await.unwrap_err();
    assert!(matches!(err, LedgerError::ReferenceNotFound(_)));

    let err = h
        .orchestrator
        .settle(2, "s1", "b1", dec!(1), "USD")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::OwnershipMismatch { .. }));

    let err = h.orchestrator.cancel(2, "b1").await.unwrap_err();
    assert!(matches!(err, LedgerError::OwnershipMismatch { .. }));

    // Nothing was recorded for the rejected requests
    assert_eq!(h.store.snapshot().len(), 1);
}

#[tokio::test]
async fn test_settle_must_reference_a_bet() {
    let h = harness();
    h.orchestrator
        .place_bet(PLAYER, "b1", dec!(10), "USD")
        .await
        .unwrap();
    h.orchestrator
        .settle(PLAYER, "s1", "b1", dec!(0), "USD")
        .await
        .unwrap();

    let err = h
        .orchestrator
        .settle(PLAYER, "s2", "s1", dec!(5), "USD")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidPriorState { .. }));
}

#[tokio::test]
async fn test_failed_bet_cannot_be_referenced() {
    let h = harness();
    h.wallet.set_mode(WalletMode::Rejecting);
    h.orchestrator
        .place_bet(PLAYER, "b1", dec!(10), "USD")
        .await
        .unwrap_err();
    h.wallet.set_mode(WalletMode::Up);

    let err = h
        .orchestrator
        .settle(PLAYER, "s1", "b1", dec!(5), "USD")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvalidPriorState { status: TransactionStatus::Failed, .. }
    ));

    let err = h.orchestrator.cancel(PLAYER, "b1").await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidPriorState { .. }));
}

#[tokio::test]
async fn test_open_transaction_blocks_immediate_attempt() {
    let h = harness();
    h.wallet.set_mode(WalletMode::Down);
    h.orchestrator
        .place_bet(PLAYER, "b1", dec!(10), "USD")
        .await
        .unwrap();
    h.wallet.set_mode(WalletMode::Up);

    let second = h
        .orchestrator
        .place_bet(PLAYER, "b2", dec!(20), "USD")
        .await
        .unwrap();
    assert_eq!(second.status, TransactionStatus::Pending);
    assert!(h.wallet.calls().is_empty());

    // Another player is unaffected
    let other = h
        .orchestrator
        .place_bet(2, "b3", dec!(20), "USD")
        .await
        .unwrap();
    assert_eq!(other.status, TransactionStatus::Confirmed);
}

#[tokio::test]
async fn test_settle_of_pending_bet_waits() {
    let h = harness();
    h.wallet.set_mode(WalletMode::Down);
    h.orchestrator
        .place_bet(PLAYER, "b1", dec!(10), "USD")
        .await
        .unwrap();
    h.wallet.set_mode(WalletMode::Up);

    let result = h
        .orchestrator
        .settle(PLAYER, "s1", "b1", dec!(20), "USD")
        .await
        .unwrap();

    assert_eq!(result.status, TransactionStatus::Pending);
    assert!(h.wallet.calls().is_empty());
}

/// Wallet that records the highest processing count seen during any call
struct ConcurrencyWallet {
    inner: FakeWallet,
    store: MemoryTransactionStore,
    max_processing: AtomicI64,
}

impl ConcurrencyWallet {
    async fn observe(&self, player_id: PlayerId) {
        let processing = self.store.count_processing(player_id).await.unwrap();
        self.max_processing.fetch_max(processing, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

#[async_trait]
impl WalletGateway for ConcurrencyWallet {
    async fn get_balance(&self, player_id: PlayerId) -> GatewayResult<Balance> {
        self.observe(player_id).await;
        self.inner.get_balance(player_id).await
    }

    async fn debit(&self, op: &WalletOperation) -> GatewayResult<Decimal> {
        self.observe(op.player_id).await;
        self.inner.debit(op).await
    }

    async fn credit(&self, op: &WalletOperation) -> GatewayResult<Decimal> {
        self.observe(op.player_id).await;
        self.inner.credit(op).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bets_never_process_twice_for_a_player() {
    let store = MemoryTransactionStore::new();
    let wallet = Arc::new(ConcurrencyWallet {
        inner: FakeWallet::new(),
        store: store.clone(),
        max_processing: AtomicI64::new(0),
    });
    let orchestrator = Orchestrator::new(Arc::new(store.clone()), wallet.clone(), test_config());

    let mut handles = Vec::new();
    for i in 0..20 {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .place_bet(PLAYER, &format!("b{i}"), dec!(1), "USD")
                .await
        }));
    }

    let mut confirmed = 0;
    for handle in handles {
        let result = handle.await.unwrap().expect("Bet should be recorded");
        assert!(matches!(
            result.status,
            TransactionStatus::Confirmed | TransactionStatus::Pending
        ));
        if result.status == TransactionStatus::Confirmed {
            confirmed += 1;
        }
    }

    assert!(wallet.max_processing.load(Ordering::SeqCst) <= 1);
    assert_eq!(store.count_processing(PLAYER).await.unwrap(), 0);
    assert_eq!(store.snapshot().len(), 20);
    assert_eq!(wallet.inner.balance(PLAYER), Decimal::from(-confirmed));
}
