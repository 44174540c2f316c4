//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use game_wallet::{
    Orchestrator, PlayerId, ReconciliationConfig, ReconciliationWorker,
    db::MemoryTransactionStore,
    wallet::{Balance, GatewayError, GatewayResult, WalletGateway, WalletOperation},
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the fake wallet answers debits and credits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletMode {
    Up,
    /// Every call fails with a retryable network error
    Down,
    /// Debits and credits are refused with a 4xx-style rejection
    Rejecting,
    /// Debits and credits go through but the reply cannot be read
    Garbled,
}

/// Direction of a recorded wallet call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Debit,
    Credit,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub call: Call,
    pub op: WalletOperation,
}

struct State {
    mode: WalletMode,
    balance_down: bool,
    delay: Duration,
    balances: HashMap<PlayerId, Decimal>,
    calls: Vec<RecordedCall>,
}

/// Scripted in-process wallet
#[derive(Clone)]
pub struct FakeWallet {
    state: Arc<Mutex<State>>,
}

impl FakeWallet {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                mode: WalletMode::Up,
                balance_down: false,
                delay: Duration::ZERO,
                balances: HashMap::new(),
                calls: Vec::new(),
            })),
        }
    }

    pub fn set_mode(&self, mode: WalletMode) {
        self.state.lock().unwrap().mode = mode;
    }

    /// Make `get_balance` fail independently of debits and credits
    pub fn set_balance_down(&self, down: bool) {
        self.state.lock().unwrap().balance_down = down;
    }

    /// Make every call take `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn set_balance(&self, player_id: PlayerId, balance: Decimal) {
        self.state.lock().unwrap().balances.insert(player_id, balance);
    }

    pub fn balance(&self, player_id: PlayerId) -> Decimal {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(&player_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    async fn wait(&self) {
        let delay = self.state.lock().unwrap().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn apply(&self, call: Call, op: &WalletOperation) -> GatewayResult<Decimal> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        match state.mode {
            WalletMode::Down => {
                return Err(GatewayError::Network("connection refused".to_string()));
            }
            WalletMode::Rejecting => {
                return Err(GatewayError::Rejected {
                    code: "INSUFFICIENT_FUNDS".to_string(),
                    message: "not enough money".to_string(),
                });
            }
            WalletMode::Up | WalletMode::Garbled => {}
        }

        state.calls.push(RecordedCall {
            call,
            op: op.clone(),
        });
        let balance = state.balances.entry(op.player_id).or_default();
        match call {
            Call::Debit => *balance -= op.amount,
            Call::Credit => *balance += op.amount,
        }
        if state.mode == WalletMode::Garbled {
            return Err(GatewayError::UnreadableSuccess {
                status: 200,
                detail: "EOF while parsing a value".to_string(),
            });
        }
        Ok(*balance)
    }
}

#[async_trait]
impl WalletGateway for FakeWallet {
    async fn get_balance(&self, player_id: PlayerId) -> GatewayResult<Balance> {
        self.wait().await;
        let state = self.state.lock().unwrap();
        if state.balance_down || state.mode == WalletMode::Down {
            return Err(GatewayError::Timeout(Duration::from_secs(10)));
        }
        Ok(Balance {
            balance: state.balances.get(&player_id).copied().unwrap_or_default(),
            currency: "USD".to_string(),
        })
    }

    async fn debit(&self, op: &WalletOperation) -> GatewayResult<Decimal> {
        self.wait().await;
        self.apply(Call::Debit, op)
    }

    async fn credit(&self, op: &WalletOperation) -> GatewayResult<Decimal> {
        self.wait().await;
        self.apply(Call::Credit, op)
    }
}

/// Worker settings without pauses so ticks run instantly
pub fn test_config() -> ReconciliationConfig {
    ReconciliationConfig {
        tick_interval: Duration::from_secs(30),
        max_attempts: 3,
        pause_between: Duration::ZERO,
        stale_claim_after: Duration::from_secs(300),
    }
}

/// Everything a test needs, sharing one store and one wallet
pub struct Harness {
    pub store: MemoryTransactionStore,
    pub wallet: FakeWallet,
    pub orchestrator: Orchestrator,
    pub worker: ReconciliationWorker,
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: ReconciliationConfig) -> Harness {
    let store = MemoryTransactionStore::new();
    let wallet = FakeWallet::new();
    let orchestrator = Orchestrator::new(
        Arc::new(store.clone()),
        Arc::new(wallet.clone()),
        config.clone(),
    );
    let worker = ReconciliationWorker::new(Arc::new(store.clone()), Arc::new(wallet.clone()), config);
    Harness {
        store,
        wallet,
        orchestrator,
        worker,
    }
}
