//! Scripted adapters and an in-memory checkpoint store for loop tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::adapters::{BalanceOracle, OrderExecutor, OrderFeed};
use crate::checkpoint::CheckpointStore;
use crate::error::{Error, ExecutionFailure, Result};
use crate::models::{OrderRequest, OrderResult, OrderSide, RemoteOrder, ReplicationRecord};
use crate::shutdown::ShutdownTrigger;
use crate::trading::MarketScope;

pub const TARGET: &str = "0xdb27bf2ac5d428a9c63dbc914611036855a6c56e";
pub const LOCAL: &str = "0x1111111111111111111111111111111111111111";

/// Buy order on a fixed market, `offset` seconds after a fixed epoch.
pub fn order(id: &str, size: Decimal, price: Decimal, offset: i64) -> RemoteOrder {
    let epoch = Utc.timestamp_opt(1_714_564_800, 0).unwrap();
    RemoteOrder {
        id: id.to_string(),
        market_id: "0xmarket".to_string(),
        asset_id: "42".to_string(),
        outcome: "Yes".to_string(),
        side: OrderSide::Buy,
        size,
        price,
        timestamp: epoch + Duration::seconds(offset),
    }
}

/// Feed that replays scripted poll results, then returns nothing.
#[derive(Default)]
pub struct ScriptedFeed {
    polls: Mutex<VecDeque<Result<Vec<RemoteOrder>>>>,
    sinces: Mutex<Vec<DateTime<Utc>>>,
}

impl ScriptedFeed {
    pub fn new(polls: Vec<Result<Vec<RemoteOrder>>>) -> Self {
        Self {
            polls: Mutex::new(polls.into()),
            sinces: Mutex::default(),
        }
    }

    /// Same batch on every one of `times` polls.
    pub fn repeating(orders: Vec<RemoteOrder>, times: usize) -> Self {
        Self::new((0..times).map(|_| Ok(orders.clone())).collect())
    }

    pub fn sinces(&self) -> Vec<DateTime<Utc>> {
        self.sinces.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.sinces.lock().unwrap().len()
    }
}

#[async_trait]
impl OrderFeed for ScriptedFeed {
    async fn fetch_recent_orders(
        &self,
        _account: &str,
        _scope: &MarketScope,
        since: DateTime<Utc>,
    ) -> Result<Vec<RemoteOrder>> {
        self.sinces.lock().unwrap().push(since);
        self.polls.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
    }
}

/// Fixed balances per account; unknown accounts do not exist.
#[derive(Default)]
pub struct FixedBalances {
    balances: HashMap<String, Decimal>,
    failures: Mutex<VecDeque<Error>>,
}

impl FixedBalances {
    pub fn new(remote: Decimal, local: Decimal) -> Self {
        let mut balances = HashMap::new();
        balances.insert(TARGET.to_string(), remote);
        balances.insert(LOCAL.to_string(), local);
        Self {
            balances,
            failures: Mutex::default(),
        }
    }

    pub fn only_remote(remote: Decimal) -> Self {
        let mut balances = HashMap::new();
        balances.insert(TARGET.to_string(), remote);
        Self {
            balances,
            failures: Mutex::default(),
        }
    }

    /// Fail the next `n` reads as unavailable.
    pub fn failing(self, n: usize) -> Self {
        {
            let mut failures = self.failures.lock().unwrap();
            for _ in 0..n {
                failures.push_back(Error::BalanceUnavailable {
                    account: TARGET.to_string(),
                    message: "rpc timeout".to_string(),
                });
            }
        }
        self
    }
}

#[async_trait]
impl BalanceOracle for FixedBalances {
    async fn get_available_balance(&self, account: &str) -> Result<Decimal> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.balances
            .get(account)
            .copied()
            .ok_or_else(|| Error::AccountNotFound(account.to_string()))
    }
}

/// Executor that replays scripted outcomes, then fills everything.
#[derive(Default)]
pub struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<ExecutionFailure>>,
    requests: Mutex<Vec<OrderRequest>>,
    trigger_on_call: Mutex<Option<ShutdownTrigger>>,
}

impl ScriptedExecutor {
    /// Fail the first calls with `failures`, in order.
    pub fn failing(failures: Vec<ExecutionFailure>) -> Self {
        Self {
            outcomes: Mutex::new(failures.into()),
            ..Default::default()
        }
    }

    /// Fire shutdown during the first placement.
    pub fn triggering(trigger: ShutdownTrigger) -> Self {
        Self {
            trigger_on_call: Mutex::new(Some(trigger)),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<OrderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderExecutor for ScriptedExecutor {
    async fn place_order(&self, _account: &str, request: &OrderRequest) -> Result<OrderResult> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };

        if let Some(trigger) = self.trigger_on_call.lock().unwrap().take() {
            trigger.trigger();
        }

        if let Some(reason) = self.outcomes.lock().unwrap().pop_front() {
            return Err(Error::execution(reason, "scripted failure"));
        }

        Ok(OrderResult {
            order_id: format!("ord-{}", n),
            filled_size: request.notional / request.reference_price,
            avg_price: request.reference_price,
        })
    }
}

/// In-memory store shared between clones, with injectable write failures.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<ReplicationRecord>>>,
    failing_writes: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn with_records(records: Vec<ReplicationRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            ..Default::default()
        }
    }

    /// Fail the next `n` writes.
    pub fn fail_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<ReplicationRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn record_for(&self, id: &str) -> Option<ReplicationRecord> {
        self.snapshot().into_iter().find(|r| r.remote_order_id == id)
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn load(&self) -> Result<HashSet<String>> {
        Ok(self
            .snapshot()
            .into_iter()
            .map(|r| r.remote_order_id)
            .collect())
    }

    async fn has(&self, remote_order_id: &str) -> Result<bool> {
        Ok(self.record_for(remote_order_id).is_some())
    }

    async fn record(&self, record: &ReplicationRecord) -> Result<()> {
        let failing = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Storage("disk full".to_string()));
        }

        let mut records = self.records.lock().unwrap();
        if !records.iter().any(|r| r.remote_order_id == record.remote_order_id) {
            records.push(record.clone());
        }
        Ok(())
    }

    async fn records(&self) -> Result<Vec<ReplicationRecord>> {
        Ok(self.snapshot())
    }
}
