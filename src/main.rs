//! Polymarket Trade Replicator
//!
//! Copies a target account's trades onto a controlled account, sized by the
//! share of the target's balance each trade represents.

mod adapters;
mod api;
mod checkpoint;
mod error;
mod models;
mod replicator;
mod shutdown;
#[cfg(test)]
mod testing;
mod trading;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::{
    BalanceOracle, ClobExecutor, DataApiFeed, DryRunExecutor, OrderExecutor, PolygonBalanceOracle,
};
use crate::api::{ClobClient, DataClient, PolygonClient, POLYGON_RPC_URL};
use crate::models::ReplicationOutcome;
use crate::replicator::Replicator;
use crate::trading::{ReplicationConfig, RetryPolicy};

/// Polymarket trade replicator CLI.
#[derive(Parser)]
#[command(name = "polyreplicator")]
#[command(about = "Replicate a Polymarket account's trades with balance-proportional sizing", long_about = None)]
struct Cli {
    /// Checkpoint location: a journal file path or a sqlite: URL
    #[arg(short, long, env = "REPLICATOR_STATE", default_value = "replicator_state.jsonl", global = true)]
    state: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start replicating
    Run(ReplicationArgs),

    /// Verify configuration, credentials and connectivity without trading
    Check(ReplicationArgs),

    /// Summarise the checkpoint store
    Status {
        /// Look up a single remote order id
        #[arg(long)]
        order: Option<String>,

        /// Number of most recent records to show
        #[arg(long, default_value_t = 10)]
        recent: usize,
    },
}

#[derive(Args, Debug, Clone)]
struct ReplicationArgs {
    /// Account whose trades are replicated
    #[arg(long, env = "TARGET_WALLET_ADDRESS")]
    target_wallet: String,

    /// Account that places the orders (defaults to the signer address)
    #[arg(long, env = "LOCAL_WALLET_ADDRESS")]
    local_wallet: Option<String>,

    /// Scaling applied to the target's balance fraction, in percent
    #[arg(long, env = "COPY_PERCENTAGE", default_value = "100")]
    copy_percentage: Decimal,

    /// Smallest order to place, in USDC
    #[arg(long, env = "MIN_BET_SIZE", default_value = "1")]
    min_bet_size: Decimal,

    /// Largest order to place, in USDC
    #[arg(long, env = "MAX_BET_SIZE", default_value = "1000")]
    max_bet_size: Decimal,

    /// Poll interval in seconds
    #[arg(long, env = "CHECK_INTERVAL_SECS", default_value_t = 15)]
    check_interval: u64,

    /// How far back the first poll looks, in seconds
    #[arg(long, env = "LOOKBACK_SECS", default_value_t = 60)]
    lookback: u64,

    /// Market condition ids to follow (repeatable or comma separated); all if empty
    #[arg(long = "market", env = "MARKET_SCOPE", value_delimiter = ',')]
    markets: Vec<String>,

    /// Attempts per network operation before giving up
    #[arg(long, default_value_t = 4)]
    max_attempts: u32,

    /// First retry delay in milliseconds
    #[arg(long, default_value_t = 500)]
    retry_base_ms: u64,

    /// Longest retry delay in milliseconds
    #[arg(long, default_value_t = 8000)]
    retry_max_ms: u64,

    /// Trades requested per poll and market
    #[arg(long, default_value_t = 100)]
    feed_limit: u32,

    /// Polygon JSON-RPC endpoint for balance reads
    #[arg(long, env = "POLYGON_RPC_URL", default_value = POLYGON_RPC_URL)]
    polygon_rpc: String,

    /// Log orders instead of placing them
    #[arg(long)]
    dry_run: bool,
}

impl ReplicationArgs {
    fn to_config(&self, local_wallet: String) -> ReplicationConfig {
        ReplicationConfig {
            target_wallet: self.target_wallet.clone(),
            local_wallet,
            copy_percentage: self.copy_percentage,
            min_bet_size: self.min_bet_size,
            max_bet_size: self.max_bet_size,
            check_interval: Duration::from_secs(self.check_interval),
            lookback: Duration::from_secs(self.lookback),
            markets: self.markets.clone(),
            feed_limit: self.feed_limit,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_millis(self.retry_base_ms),
                max_delay: Duration::from_millis(self.retry_max_ms),
            },
            dry_run: self.dry_run,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run(args) => run(args, &cli.state).await,
        Commands::Check(args) => check(args).await,
        Commands::Status { order, recent } => status(&cli.state, order, recent).await,
    }
}

async fn run(args: ReplicationArgs, state: &str) -> Result<()> {
    let clob = match ClobClient::from_env() {
        Ok(client) => {
            info!(address = %client.address(), "CLOB client initialized");
            Some(client)
        }
        Err(e) if args.dry_run => {
            warn!("CLOB client not configured: {}", e);
            None
        }
        Err(e) => return Err(e.context("CLOB credentials are required unless --dry-run is set")),
    };

    let local_wallet = args
        .local_wallet
        .clone()
        .or_else(|| clob.as_ref().map(|c| c.address().to_string()))
        .unwrap_or_default();
    let config = args.to_config(local_wallet).validate()?;

    print_banner(&config, state);

    let store = checkpoint::open(state).await?;
    let feed = Arc::new(DataApiFeed::new(DataClient::new()?, config.feed_limit));
    let balances = Arc::new(PolygonBalanceOracle::new(PolygonClient::new(
        args.polygon_rpc.clone(),
    )?));
    let executor: Arc<dyn OrderExecutor> = match clob {
        Some(client) if !config.dry_run => Arc::new(ClobExecutor::new(client)),
        _ => Arc::new(DryRunExecutor),
    };

    let (trigger, shutdown) = shutdown::channel();
    trigger.listen_for_signals();

    let mut replicator = Replicator::new(config, feed, balances, executor, store, shutdown).await?;
    let result = replicator.run().await;
    info!(state = ?replicator.state(), "Replicator exited");

    println!("\n=== Session Summary ===");
    println!("{}", replicator.stats());

    result.context("Replication stopped")
}

fn print_banner(config: &ReplicationConfig, state: &str) {
    let mode = if config.dry_run { "DRY RUN" } else { "LIVE" };
    let markets = if config.markets.is_empty() {
        "all".to_string()
    } else {
        config.markets.join(", ")
    };

    println!("\n=== Polymarket Trade Replicator ===");
    println!("Mode:            {}", mode);
    println!("Monitoring:      {}", config.target_wallet);
    println!("Trading as:      {}", config.local_wallet);
    println!("Copy percentage: {}%", config.copy_percentage);
    println!("Order size:      ${} - ${}", config.min_bet_size, config.max_bet_size);
    println!("Poll interval:   {}s", config.check_interval.as_secs());
    println!("Markets:         {}", markets);
    println!("Checkpoint:      {}", state);
    println!();
}

async fn check(args: ReplicationArgs) -> Result<()> {
    let mut failures = 0;
    let mut report = |name: &str, outcome: std::result::Result<String, String>| match outcome {
        Ok(detail) => println!("  [ OK ] {:<16} {}", name, detail),
        Err(detail) => {
            failures += 1;
            println!("  [FAIL] {:<16} {}", name, detail);
        }
    };

    println!("\n=== Pre-flight Check ===");

    let clob = ClobClient::from_env();
    report(
        "credentials",
        clob.as_ref()
            .map(|c| format!("signer {}", c.address()))
            .map_err(|e| format!("{:#}", e)),
    );

    if let Ok(client) = &clob {
        report(
            "clob",
            client
                .health()
                .await
                .map(|_| "reachable".to_string())
                .map_err(|e| format!("{:#}", e)),
        );
    }

    let local_wallet = args
        .local_wallet
        .clone()
        .or_else(|| clob.as_ref().ok().map(|c| c.address().to_string()))
        .unwrap_or_default();
    let config = args.to_config(local_wallet).validate();
    report(
        "configuration",
        config
            .as_ref()
            .map(|_| "valid".to_string())
            .map_err(|e| e.to_string()),
    );

    if let Ok(config) = &config {
        let oracle = PolygonBalanceOracle::new(PolygonClient::new(args.polygon_rpc.clone())?);
        for (name, account) in [
            ("target balance", &config.target_wallet),
            ("local balance", &config.local_wallet),
        ] {
            report(
                name,
                oracle
                    .get_available_balance(account)
                    .await
                    .map(|b| format!("${} USDC", b.round_dp(2)))
                    .map_err(|e| e.to_string()),
            );
        }
    }

    if failures > 0 {
        anyhow::bail!("{} check(s) failed", failures);
    }
    println!("\nAll checks passed.");
    Ok(())
}

async fn status(state: &str, order: Option<String>, recent: usize) -> Result<()> {
    let store = checkpoint::open(state).await?;

    if let Some(id) = order {
        if !store.has(&id).await? {
            println!("{}: not processed", id);
            return Ok(());
        }
        let records = store.records().await?;
        if let Some(record) = records.iter().find(|r| r.remote_order_id == id) {
            println!("{}: {} at {}", id, record.outcome, record.processed_at);
            if let Some(size) = record.replicated_size {
                println!("  Size:     ${}", size);
            }
            if let Some(order_id) = &record.order_id {
                println!("  Order ID: {}", order_id);
            }
            if let Some(detail) = &record.detail {
                println!("  Detail:   {}", detail);
            }
        }
        return Ok(());
    }

    let records = store.records().await?;
    if records.is_empty() {
        println!("No orders processed yet. Use 'polyreplicator run' to start.");
        return Ok(());
    }

    let mut counts: HashMap<ReplicationOutcome, usize> = HashMap::new();
    let mut volume = Decimal::ZERO;
    for record in &records {
        *counts.entry(record.outcome).or_default() += 1;
        volume += record.replicated_size.unwrap_or_default();
    }

    println!("\n=== Replicator Status ===");
    println!("Checkpoint:  {}", state);
    println!("Processed:   {}", records.len());
    for outcome in [
        ReplicationOutcome::Replicated,
        ReplicationOutcome::Skipped,
        ReplicationOutcome::Failed,
    ] {
        println!("  {:<10} {}", outcome, counts.get(&outcome).copied().unwrap_or(0));
    }
    println!("Volume:      ${}", volume);

    println!("\n{:<24} {:<10} {:>10}  {}", "PROCESSED", "OUTCOME", "SIZE", "REMOTE ORDER");
    println!("{}", "-".repeat(96));
    for record in records.iter().rev().take(recent) {
        println!(
            "{:<24} {:<10} {:>10}  {}",
            record.processed_at.format("%Y-%m-%d %H:%M:%S"),
            record.outcome,
            record
                .replicated_size
                .map(|s| format!("${}", s))
                .unwrap_or_else(|| "-".to_string()),
            truncate(&record.remote_order_id, 48)
        );
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
