//! Replication configuration, validated once at startup.

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::RetryPolicy;
use crate::error::{Error, Result};

/// Which markets to observe on the target account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketScope {
    All,
    Market(String),
}

impl MarketScope {
    pub fn market_id(&self) -> Option<&str> {
        match self {
            MarketScope::All => None,
            MarketScope::Market(id) => Some(id),
        }
    }
}

impl std::fmt::Display for MarketScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketScope::All => f.write_str("all markets"),
            MarketScope::Market(id) => f.write_str(id),
        }
    }
}

/// Configuration for the replication loop.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Account whose trades are replicated (0x-prefixed, lowercase)
    pub target_wallet: String,

    /// Account orders are placed for (0x-prefixed, lowercase)
    pub local_wallet: String,

    /// Scaling applied to the remote balance fraction, in percent
    pub copy_percentage: Decimal,

    /// Minimum order size in USDC; smaller targets are skipped
    pub min_bet_size: Decimal,

    /// Maximum order size in USDC; larger targets are clamped
    pub max_bet_size: Decimal,

    /// Poll period
    pub check_interval: Duration,

    /// How far back the first poll looks
    pub lookback: Duration,

    /// Condition IDs to observe; empty means all markets
    pub markets: Vec<String>,

    /// Rows requested from the feed per market scope
    pub feed_limit: u32,

    pub retry: RetryPolicy,

    /// Simulate order placement
    pub dry_run: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            target_wallet: String::new(),
            local_wallet: String::new(),
            copy_percentage: dec!(100),
            min_bet_size: dec!(1),
            max_bet_size: dec!(1000),
            check_interval: Duration::from_secs(15),
            lookback: Duration::from_secs(60),
            markets: Vec::new(),
            feed_limit: 100,
            retry: RetryPolicy::default(),
            dry_run: false,
        }
    }
}

impl ReplicationConfig {
    /// Check every field and normalise wallet addresses.
    pub fn validate(mut self) -> Result<Self> {
        self.target_wallet = normalize_address("target wallet", &self.target_wallet)?;
        self.local_wallet = normalize_address("local wallet", &self.local_wallet)?;

        if self.target_wallet == self.local_wallet {
            return Err(Error::Configuration(
                "target wallet and local wallet must differ".to_string(),
            ));
        }

        if self.copy_percentage <= Decimal::ZERO || self.copy_percentage > dec!(1000) {
            return Err(Error::Configuration(format!(
                "copy percentage must be in (0, 1000], got {}",
                self.copy_percentage
            )));
        }

        if self.min_bet_size <= Decimal::ZERO || self.max_bet_size <= Decimal::ZERO {
            return Err(Error::Configuration(
                "min and max bet sizes must be positive".to_string(),
            ));
        }

        if self.min_bet_size > self.max_bet_size {
            return Err(Error::Configuration(format!(
                "min bet size {} exceeds max bet size {}",
                self.min_bet_size, self.max_bet_size
            )));
        }

        if self.check_interval.is_zero() {
            return Err(Error::Configuration(
                "check interval must be positive".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::Configuration(
                "retry attempts must be at least 1".to_string(),
            ));
        }

        if self.feed_limit == 0 {
            return Err(Error::Configuration("feed limit must be positive".to_string()));
        }

        for market in &mut self.markets {
            let trimmed = market.trim();
            if trimmed.is_empty() {
                return Err(Error::Configuration("empty market id in scope".to_string()));
            }
            *market = trimmed.to_string();
        }

        Ok(self)
    }

    /// Market scopes to poll each cycle.
    pub fn scopes(&self) -> Vec<MarketScope> {
        if self.markets.is_empty() {
            vec![MarketScope::All]
        } else {
            self.markets
                .iter()
                .map(|m| MarketScope::Market(m.clone()))
                .collect()
        }
    }
}

fn normalize_address(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Configuration(format!("{} is required", field)));
    }
    if !value.starts_with("0x") {
        return Err(Error::Configuration(format!("{} should start with 0x", field)));
    }
    Address::from_str(value)
        .map_err(|e| Error::Configuration(format!("{} is not a valid address: {}", field, e)))?;
    Ok(value.to_lowercase())
}
