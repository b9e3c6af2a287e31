//! Replication loop: poll the target account, size each new order against
//! both balances, place it, and checkpoint the outcome.
//!
//! Orders are handled one at a time and cycles never overlap. An order id
//! joins the in-memory seen set only after its record is durable, so a crash
//! at any point leads to reprocessing rather than a lost or doubled order.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::adapters::{BalanceOracle, OrderExecutor, OrderFeed};
use crate::checkpoint::CheckpointStore;
use crate::error::{Error, Result};
use crate::models::{OrderRequest, RemoteOrder, ReplicationOutcome, ReplicationRecord};
use crate::shutdown::Shutdown;
use crate::trading::{size_position, ReplicationConfig};

/// Where the loop currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Polling,
    /// Handling the remote order with this id
    Processing(String),
    ShuttingDown,
}

/// Counters for the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicatorStats {
    pub cycles_completed: u64,
    pub cycles_aborted: u64,
    pub orders_observed: u64,
    pub replicated: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl fmt::Display for ReplicatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cycles completed:  {}", self.cycles_completed)?;
        writeln!(f, "Cycles aborted:    {}", self.cycles_aborted)?;
        writeln!(f, "Orders observed:   {}", self.orders_observed)?;
        writeln!(f, "Replicated:        {}", self.replicated)?;
        writeln!(f, "Skipped:           {}", self.skipped)?;
        write!(f, "Failed:            {}", self.failed)
    }
}

pub struct Replicator {
    config: ReplicationConfig,
    feed: Arc<dyn OrderFeed>,
    balances: Arc<dyn BalanceOracle>,
    executor: Arc<dyn OrderExecutor>,
    store: Box<dyn CheckpointStore>,

    seen: HashSet<String>,
    last_poll: Option<DateTime<Utc>>,
    /// Records decided on but not yet durable
    unflushed: VecDeque<ReplicationRecord>,

    shutdown: Shutdown,
    state: LoopState,
    stats: ReplicatorStats,
}

impl Replicator {
    /// Build the loop and seed the seen set from `store`.
    pub async fn new(
        config: ReplicationConfig,
        feed: Arc<dyn OrderFeed>,
        balances: Arc<dyn BalanceOracle>,
        executor: Arc<dyn OrderExecutor>,
        store: Box<dyn CheckpointStore>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let seen = store.load().await?;
        info!(checkpointed = seen.len(), "Loaded checkpoint state");

        Ok(Self {
            config,
            feed,
            balances,
            executor,
            store,
            seen,
            last_poll: None,
            unflushed: VecDeque::new(),
            shutdown,
            state: LoopState::Idle,
            stats: ReplicatorStats::default(),
        })
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn stats(&self) -> &ReplicatorStats {
        &self.stats
    }

    /// Run cycles every `check_interval` until shutdown.
    ///
    /// Returns `Ok` on graceful shutdown and the error on anything fatal.
    /// Other cycle errors are logged and the next tick tries again.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            target_wallet = %self.config.target_wallet,
            interval_secs = self.config.check_interval.as_secs(),
            scopes = self.config.scopes().len(),
            "Starting replication loop"
        );

        let mut ticker = interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = self.shutdown.clone();

        loop {
            if shutdown.is_triggered() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.wait() => break,
            }

            match self.run_cycle().await {
                Ok(()) => self.stats.cycles_completed += 1,
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Fatal error, stopping");
                    self.state = LoopState::ShuttingDown;
                    if let Err(flush) = self.drain_pending().await {
                        error!(error = %flush, "Pending checkpoints lost on fatal exit");
                    }
                    return Err(e);
                }
                Err(e) => {
                    let during = match &self.state {
                        LoopState::Processing(id) => id.as_str(),
                        _ => "poll",
                    };
                    warn!(error = %e, during, "Cycle aborted, retrying next tick");
                    self.stats.cycles_aborted += 1;
                    self.state = LoopState::Idle;
                }
            }
        }

        self.state = LoopState::ShuttingDown;
        self.drain_pending().await?;
        info!("Replication loop stopped");
        Ok(())
    }

    /// Last attempt to persist queued records before exiting. Fails if any
    /// placed order would be left without a record.
    async fn drain_pending(&mut self) -> Result<()> {
        if self.unflushed.is_empty() {
            return Ok(());
        }

        info!(pending = self.unflushed.len(), "Flushing pending checkpoints before exit");
        self.flush_pending().await.map_err(|e| {
            error!(pending = self.unflushed.len(), error = %e, "Exiting with unrecorded orders");
            Error::Storage(format!(
                "{} checkpoint record(s) not persisted: {}",
                self.unflushed.len(),
                e
            ))
        })
    }

    /// One poll-and-process pass. Any error aborts the rest of the cycle.
    pub async fn run_cycle(&mut self) -> Result<()> {
        self.flush_pending().await?;

        self.state = LoopState::Polling;
        let started = Utc::now();
        let orders = self.poll(started).await?;

        if !orders.is_empty() {
            info!(count = orders.len(), "New remote orders");
        }
        self.stats.orders_observed += orders.len() as u64;

        for order in orders {
            self.state = LoopState::Processing(order.id.clone());
            let record = self.process(&order).await?;
            self.commit(record).await?;
        }

        self.state = LoopState::Idle;
        self.last_poll = Some(started);
        Ok(())
    }

    /// Unseen orders across every scope, oldest first.
    async fn poll(&self, now: DateTime<Utc>) -> Result<Vec<RemoteOrder>> {
        let since = self.poll_window_start(now);
        let account = self.config.target_wallet.as_str();
        let mut orders = Vec::new();

        for scope in self.config.scopes() {
            let batch = self
                .config
                .retry
                .run("fetch_recent_orders", &self.shutdown, || {
                    self.feed.fetch_recent_orders(account, &scope, since)
                })
                .await?;
            debug!(scope = %scope, count = batch.len(), "Polled");
            orders.extend(batch);
        }

        orders.retain(|o| !self.seen.contains(&o.id));
        orders.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        orders.dedup_by(|a, b| a.id == b.id);
        Ok(orders)
    }

    /// Overlap the previous window by one interval so late-indexed trades are
    /// still seen; dedup absorbs the repeats.
    fn poll_window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let overlap = chrono::Duration::from_std(self.config.check_interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(15));
        match self.last_poll {
            Some(last) => last - overlap,
            None => {
                let lookback = chrono::Duration::from_std(self.config.lookback)
                    .unwrap_or_else(|_| chrono::Duration::seconds(60));
                now - lookback
            }
        }
    }

    /// Decide and, if sized, place `order`. Errors only when a balance cannot
    /// be read.
    async fn process(&self, order: &RemoteOrder) -> Result<ReplicationRecord> {
        let remote_balance = self.balance(&self.config.target_wallet).await?;
        let local_balance = self.balance(&self.config.local_wallet).await?;

        let decision = size_position(
            order,
            remote_balance,
            local_balance,
            self.config.copy_percentage,
            self.config.min_bet_size,
            self.config.max_bet_size,
        );
        debug!(
            id = %order.id,
            outcome = %order.outcome,
            %remote_balance,
            %local_balance,
            target = %decision.target_size,
            bounded = %decision.bounded_size,
            reason = %decision.reason,
            "Sized"
        );

        if !decision.reason.places_order() {
            return Ok(ReplicationRecord::skipped(&order.id, decision.reason.as_str()));
        }

        let request = OrderRequest::replicate(order, decision.bounded_size);
        let account = self.config.local_wallet.as_str();
        let placed = self
            .config
            .retry
            .run("place_order", &self.shutdown, || {
                self.executor.place_order(account, &request)
            })
            .await;

        Ok(match placed {
            Ok(result) => {
                debug!(
                    id = %order.id,
                    order_id = %result.order_id,
                    filled = %result.filled_size,
                    avg_price = %result.avg_price,
                    "Filled"
                );
                ReplicationRecord::replicated(&order.id, decision.bounded_size, &result.order_id)
            }
            Err(e) => {
                let detail = match &e {
                    Error::Execution { reason, message } => format!("{}: {}", reason.as_str(), message),
                    other => other.to_string(),
                };
                warn!(id = %order.id, error = %detail, "Order placement failed");
                ReplicationRecord::failed(&order.id, detail)
            }
        })
    }

    async fn balance(&self, account: &str) -> Result<Decimal> {
        self.config
            .retry
            .run("get_available_balance", &self.shutdown, || {
                self.balances.get_available_balance(account)
            })
            .await
    }

    /// Persist `record`, then mark its order seen. On failure the record is
    /// queued for the next cycle and the order stays unseen.
    async fn commit(&mut self, record: ReplicationRecord) -> Result<()> {
        if let Err(e) = self.store.record(&record).await {
            error!(id = %record.remote_order_id, error = %e, "Checkpoint write failed");
            self.unflushed.push_back(record);
            return Err(e);
        }
        self.mark_recorded(&record);
        Ok(())
    }

    /// Retry writes that failed in an earlier cycle before polling again.
    async fn flush_pending(&mut self) -> Result<()> {
        while let Some(record) = self.unflushed.front().cloned() {
            self.store.record(&record).await?;
            self.unflushed.pop_front();
            info!(id = %record.remote_order_id, "Pending checkpoint flushed");
            self.mark_recorded(&record);
        }
        Ok(())
    }

    fn mark_recorded(&mut self, record: &ReplicationRecord) {
        self.seen.insert(record.remote_order_id.clone());

        match record.outcome {
            ReplicationOutcome::Replicated => self.stats.replicated += 1,
            ReplicationOutcome::Skipped => self.stats.skipped += 1,
            ReplicationOutcome::Failed => self.stats.failed += 1,
        }

        info!(
            id = %record.remote_order_id,
            outcome = %record.outcome,
            size = ?record.replicated_size,
            detail = ?record.detail,
            "Recorded"
        );
    }
}
