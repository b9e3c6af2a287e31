//! Wire types for the Polymarket data API and Polygon JSON-RPC.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade response from /trades endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResponse {
    pub side: String,
    #[serde(default)]
    pub asset: String,
    pub condition_id: String,
    pub size: Decimal,
    pub price: Decimal,
    pub timestamp: i64,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub transaction_hash: String,
}

/// Query parameters for /trades.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesParams {
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    pub taker_only: bool,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'a str,
    pub id: u64,
    pub method: &'a str,
    pub params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}
