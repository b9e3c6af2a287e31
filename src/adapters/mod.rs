//! Seams between the replication loop and the venue.
//!
//! Each trait translates venue failures into the typed [`Error`](crate::error::Error)
//! taxonomy so the loop can decide between retry, skip and abort.

mod balance;
mod executor;
mod feed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::{OrderRequest, OrderResult, RemoteOrder};
use crate::trading::MarketScope;

pub use balance::PolygonBalanceOracle;
pub use executor::{ClobExecutor, DryRunExecutor};
pub use feed::DataApiFeed;

/// Reads an account's recent trade activity.
#[async_trait]
pub trait OrderFeed: Send + Sync {
    /// Orders at or after `since`, in no particular order. May repeat
    /// orders returned by earlier calls.
    async fn fetch_recent_orders(
        &self,
        account: &str,
        scope: &MarketScope,
        since: DateTime<Utc>,
    ) -> Result<Vec<RemoteOrder>>;
}

/// Reports spendable collateral for an account.
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    async fn get_available_balance(&self, account: &str) -> Result<Decimal>;
}

/// Places orders for the controlled account.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn place_order(&self, account: &str, request: &OrderRequest) -> Result<OrderResult>;
}
