//! Polygon JSON-RPC client for reading USDC collateral balances.

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use tracing::debug;

use super::types::{JsonRpcRequest, JsonRpcResponse};

pub const POLYGON_RPC_URL: &str = "https://polygon-rpc.com";

/// Bridged USDC (USDC.e) used as Polymarket collateral
pub const USDC_CONTRACT: &str = "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174";

const USDC_DECIMALS: u32 = 6;

/// `balanceOf(address)` selector
const BALANCE_OF_SELECTOR: &str = "70a08231";

/// Polygon RPC client.
pub struct PolygonClient {
    rpc_url: String,
    http: Client,
}

impl PolygonClient {
    pub fn new(rpc_url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { rpc_url, http })
    }

    /// USDC balance of `address` in whole USDC.
    pub async fn usdc_balance(&self, address: &Address) -> Result<Decimal> {
        let params = serde_json::json!([
            {
                "to": USDC_CONTRACT,
                "data": balance_of_calldata(address),
            },
            "latest"
        ]);

        let raw: String = self.rpc_call("eth_call", params).await?;
        debug!(address = %address, raw = %raw, "USDC balance");
        parse_usdc_amount(&raw)
    }

    async fn rpc_call<T: for<'de> serde::Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("RPC {} request failed", method))?;

        if !response.status().is_success() {
            return Err(anyhow!("RPC {} failed: {}", method, response.status()));
        }

        let body: JsonRpcResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        if let Some(err) = body.error {
            return Err(anyhow!("RPC {} error {}: {}", method, err.code, err.message));
        }

        body.result
            .ok_or_else(|| anyhow!("RPC {} returned no result", method))
    }
}

/// Parse a wallet address, rejecting anything that is not 20 bytes of hex.
pub fn parse_address(address: &str) -> Option<Address> {
    Address::from_str(address).ok()
}

fn balance_of_calldata(address: &Address) -> String {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    format!("0x{}{}", BALANCE_OF_SELECTOR, hex::encode(word))
}

/// Convert a hex-encoded uint256 token amount into USDC.
fn parse_usdc_amount(raw: &str) -> Result<Decimal> {
    let digits = raw.trim_start_matches("0x").trim_start_matches('0');
    if digits.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let units = u128::from_str_radix(digits, 16)
        .with_context(|| format!("Balance out of range: {}", raw))?;
    let units = i128::try_from(units).context("Balance out of range")?;

    Decimal::try_from_i128_with_scale(units, USDC_DECIMALS)
        .map_err(|e| anyhow!("Balance out of range: {}", e))
}
