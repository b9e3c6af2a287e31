//! Polymarket Data API client for reading an account's trade history.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{OrderSide, RemoteOrder};

use super::types::*;

const DATA_API_BASE: &str = "https://data-api.polymarket.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for Polymarket Data API (read-only operations).
pub struct DataClient {
    client: Client,
    base_url: String,
}

impl DataClient {
    /// Create a new data client with default settings.
    pub fn new() -> Result<Self> {
        Self::with_base_url(DATA_API_BASE.to_string())
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Fetch the most recent trades for an account, newest first.
    pub async fn get_trades(
        &self,
        address: &str,
        market: Option<&str>,
        limit: u32,
    ) -> Result<Vec<TradeResponse>> {
        let params = TradesParams {
            user: address.to_string(),
            market: market.map(str::to_string),
            limit: Some(limit.min(500)),
            taker_only: false,
        };
        let url = format!("{}/trades", self.base_url);

        debug!(url = %url, user = %address, market = ?market, "Fetching trades");

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .context("Failed to fetch trades")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Trades request failed: {} - {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse trades response")
    }
}

/// Convert a trade row into a `RemoteOrder`.
///
/// Rows that cannot be identified (no transaction hash) or have an unknown
/// side are dropped.
///
/// The id is `transaction_hash:asset:side`. Trade rows carry no per-fill id,
/// so several fills of the same asset and side inside one transaction share
/// an id and are replicated once, from the first row seen.
pub fn to_remote_order(trade: TradeResponse) -> Option<RemoteOrder> {
    if trade.transaction_hash.is_empty() {
        warn!(market = %trade.condition_id, "Trade without transaction hash");
        return None;
    }

    let Some(side) = OrderSide::parse(&trade.side) else {
        warn!(side = %trade.side, "Unknown trade side");
        return None;
    };

    let timestamp = Utc.timestamp_opt(trade.timestamp, 0).single()?;

    // One transaction can fill several outcome tokens, so the hash alone is
    // not unique.
    let id = format!("{}:{}:{}", trade.transaction_hash, trade.asset, side.as_str());

    Some(RemoteOrder {
        id,
        market_id: trade.condition_id,
        asset_id: trade.asset,
        outcome: trade.outcome,
        side,
        size: trade.size,
        price: trade.price,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade_json(side: &str, tx: &str) -> String {
        format!(
            r#"{{
                "proxyWallet": "0xdb27bf2ac5d428a9c63dbc914611036855a6c56e",
                "side": "{}",
                "asset": "7142",
                "conditionId": "0xabc",
                "size": 100,
                "price": 0.5,
                "timestamp": 1714564800,
                "title": "Will it rain?",
                "outcome": "Yes",
                "outcomeIndex": 0,
                "transactionHash": "{}"
            }}"#,
            side, tx
        )
    }

    #[test]
    fn test_to_remote_order() {
        let trade: TradeResponse = serde_json::from_str(&trade_json("BUY", "0xfeed")).unwrap();
        let order = to_remote_order(trade).unwrap();

        assert_eq!(order.id, "0xfeed:7142:BUY");
        assert_eq!(order.market_id, "0xabc");
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.size, dec!(100));
        assert_eq!(order.price, dec!(0.5));
        assert_eq!(order.timestamp.timestamp(), 1714564800);
    }

    #[test]
    fn test_id_distinguishes_asset_and_side() {
        let buy: TradeResponse = serde_json::from_str(&trade_json("BUY", "0xfeed")).unwrap();
        let sell: TradeResponse = serde_json::from_str(&trade_json("SELL", "0xfeed")).unwrap();
        let mut other_asset: TradeResponse =
            serde_json::from_str(&trade_json("BUY", "0xfeed")).unwrap();
        other_asset.asset = "7143".to_string();
        let repeat: TradeResponse = serde_json::from_str(&trade_json("BUY", "0xfeed")).unwrap();

        let ids: Vec<String> = [buy, sell, other_asset, repeat]
            .into_iter()
            .map(|t| to_remote_order(t).unwrap().id)
            .collect();
        assert_eq!(ids[0], "0xfeed:7142:BUY");
        assert_eq!(ids[1], "0xfeed:7142:SELL");
        assert_eq!(ids[2], "0xfeed:7143:BUY");
        // Same transaction, asset and side: one id
        assert_eq!(ids[3], ids[0]);
    }

    #[test]
    fn test_unidentifiable_rows_dropped() {
        let no_hash: TradeResponse = serde_json::from_str(&trade_json("SELL", "")).unwrap();
        assert!(to_remote_order(no_hash).is_none());

        let bad_side: TradeResponse = serde_json::from_str(&trade_json("MERGE", "0x1")).unwrap();
        assert!(to_remote_order(bad_side).is_none());
    }
}
