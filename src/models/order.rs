//! Orders observed on the target account and orders we submit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    /// Side encoding used in signed CLOB orders.
    pub fn as_u8(&self) -> u8 {
        match self {
            OrderSide::Buy => 0,
            OrderSide::Sell => 1,
        }
    }

    /// Parse a venue side string, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Some(OrderSide::Buy),
            "SELL" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trade event observed on the target account. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteOrder {
    /// Venue-derived unique identifier
    pub id: String,

    /// Market condition ID (0x-prefixed)
    pub market_id: String,

    /// Outcome token traded
    pub asset_id: String,

    /// Outcome label ("Yes", "No", ...)
    #[serde(default)]
    pub outcome: String,

    pub side: OrderSide,

    /// Number of outcome tokens traded
    pub size: Decimal,

    /// Price per token in USDC
    pub price: Decimal,

    pub timestamp: DateTime<Utc>,
}

impl RemoteOrder {
    /// USDC value of the order (size x price), `None` on overflow.
    pub fn notional(&self) -> Option<Decimal> {
        self.size.checked_mul(self.price)
    }
}

/// An order to place on the controlled account.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub market_id: String,
    pub asset_id: String,
    pub side: OrderSide,

    /// Size in USDC
    pub notional: Decimal,

    /// Price observed on the remote order, used to convert notional to shares
    pub reference_price: Decimal,
}

impl OrderRequest {
    /// Build the replicated order for `remote` at the given USDC size.
    pub fn replicate(remote: &RemoteOrder, notional: Decimal) -> Self {
        Self {
            market_id: remote.market_id.clone(),
            asset_id: remote.asset_id.clone(),
            side: remote.side,
            notional,
            reference_price: remote.price,
        }
    }
}

/// Result of a successful placement.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderResult {
    pub order_id: String,
    pub filled_size: Decimal,
    pub avg_price: Decimal,
}
