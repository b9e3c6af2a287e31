//! Polymarket CLOB (Central Limit Order Book) client for order execution.
//!
//! Orders are signed locally with EIP-712 and submitted with L2 (HMAC)
//! authentication headers. Placement failures are classified into
//! [`ExecutionFailure`] so the caller can decide whether to retry.

use alloy_primitives::{Address, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{anyhow, Context};
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, ExecutionFailure, Result};
use crate::models::OrderSide;

/// CLOB API base URL
pub const CLOB_URL: &str = "https://clob.polymarket.com";

/// Polymarket CTF Exchange contract on Polygon
pub const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Price tick for binary outcome tokens
const TICK: Decimal = dec!(0.01);

/// Slippage tolerance applied to the touch price for market orders
const SLIPPAGE: Decimal = dec!(0.005);

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Fill-or-kill market order
    Fok,
}

/// Signature type for CLOB orders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    Eoa = 0,
}

/// Signed order ready for submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub salt: String,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub side: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    pub signature_type: u8,
    pub signature: String,
}

/// Order submission request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub order: SignedOrder,
    pub owner: String,
    pub order_type: OrderType,
}

/// Response from order placement
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(alias = "orderID")]
    pub order_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub error_msg: String,
    pub status: Option<String>,
    #[serde(default)]
    pub making_amount: Option<String>,
    #[serde(default)]
    pub taking_amount: Option<String>,
}

/// Order book entry
#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    pub price: String,
}

/// Order book response
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// An order that was accepted by the venue.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub response: OrderResponse,
    pub shares: Decimal,
    pub price: Decimal,
}

/// CLOB API client for executing trades on Polymarket.
pub struct ClobClient {
    http: Client,
    base_url: String,
    signer: PrivateKeySigner,
    api_key: String,
    api_secret: String,
    api_passphrase: String,
    chain_id: u64,
}

impl ClobClient {
    /// Create a new CLOB client.
    ///
    /// `chain_id` is 137 for Polygon mainnet and 80002 for Amoy.
    pub fn new(
        private_key: &str,
        api_key: &str,
        api_secret: &str,
        api_passphrase: &str,
        chain_id: u64,
    ) -> anyhow::Result<Self> {
        let pk = private_key.strip_prefix("0x").unwrap_or(private_key);
        let signer = PrivateKeySigner::from_str(pk).context("Invalid private key")?;

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: CLOB_URL.to_string(),
            signer,
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            api_passphrase: api_passphrase.to_string(),
            chain_id,
        })
    }

    /// Create from environment variables:
    /// - POLYMARKET_PRIVATE_KEY
    /// - POLYMARKET_API_KEY
    /// - POLYMARKET_API_SECRET
    /// - POLYMARKET_API_PASSPHRASE
    /// - POLYMARKET_CHAIN_ID (defaults to 137)
    pub fn from_env() -> anyhow::Result<Self> {
        let private_key =
            std::env::var("POLYMARKET_PRIVATE_KEY").context("POLYMARKET_PRIVATE_KEY not set")?;
        let api_key = std::env::var("POLYMARKET_API_KEY").context("POLYMARKET_API_KEY not set")?;
        let api_secret =
            std::env::var("POLYMARKET_API_SECRET").context("POLYMARKET_API_SECRET not set")?;
        let api_passphrase = std::env::var("POLYMARKET_API_PASSPHRASE")
            .context("POLYMARKET_API_PASSPHRASE not set")?;
        let chain_id: u64 = std::env::var("POLYMARKET_CHAIN_ID")
            .unwrap_or_else(|_| "137".to_string())
            .parse()
            .context("Invalid POLYMARKET_CHAIN_ID")?;

        Self::new(&private_key, &api_key, &api_secret, &api_passphrase, chain_id)
    }

    /// Get the wallet address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Check that the CLOB answers at all.
    pub async fn health(&self) -> anyhow::Result<()> {
        let url = format!("{}/", self.base_url);
        let resp = self.http.get(&url).send().await.context("CLOB unreachable")?;

        if !resp.status().is_success() {
            return Err(anyhow!("CLOB health check failed: {}", resp.status()));
        }
        Ok(())
    }

    /// Get order book for a token.
    pub async fn get_order_book(&self, token_id: &str) -> anyhow::Result<OrderBook> {
        let url = format!("{}/book", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await
            .context("Failed to fetch order book")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to get order book: {} - {}", status, text));
        }

        resp.json().await.context("Failed to parse order book")
    }

    /// Best price on the side a market order would take from.
    ///
    /// The book is not guaranteed to be sorted, so scan every level.
    pub async fn touch_price(&self, token_id: &str, side: OrderSide) -> anyhow::Result<Option<Decimal>> {
        let book = self.get_order_book(token_id).await?;
        let prices = |levels: &[BookLevel]| -> anyhow::Result<Vec<Decimal>> {
            levels
                .iter()
                .map(|l| Decimal::from_str(&l.price).with_context(|| format!("Bad price {}", l.price)))
                .collect()
        };

        Ok(match side {
            OrderSide::Buy => prices(&book.asks)?.into_iter().min(),
            OrderSide::Sell => prices(&book.bids)?.into_iter().max(),
        })
    }

    /// Place a fill-or-kill order priced off the current book.
    ///
    /// `shares` is the outcome-token quantity. An empty book falls back to
    /// `reference_price`.
    pub async fn market_order(
        &self,
        token_id: &str,
        side: OrderSide,
        shares: Decimal,
        reference_price: Decimal,
    ) -> Result<PlacedOrder> {
        let touch = self
            .touch_price(token_id, side)
            .await
            .map_err(|e| Error::execution(ExecutionFailure::Network, format!("{:#}", e)))?;

        let price = limit_price(touch.unwrap_or(reference_price), side);
        debug!(token_id, side = %side, %shares, %price, "Market order priced");

        let response = self
            .place_order(token_id, side, shares, price, OrderType::Fok)
            .await?;

        Ok(PlacedOrder {
            response,
            shares,
            price,
        })
    }

    /// Sign and submit an order.
    pub async fn place_order(
        &self,
        token_id: &str,
        side: OrderSide,
        shares: Decimal,
        price: Decimal,
        order_type: OrderType,
    ) -> Result<OrderResponse> {
        let order = self
            .build_signed_order(token_id, side, shares, price)
            .await
            .map_err(|e| Error::execution(ExecutionFailure::Rejected, format!("{:#}", e)))?;

        let payload = OrderPayload {
            order,
            owner: self.api_key.clone(),
            order_type,
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| Error::execution(ExecutionFailure::Rejected, e.to_string()))?;

        let headers = self
            .build_l2_headers("POST", "/order", Some(&body))
            .map_err(|e| Error::execution(ExecutionFailure::Rejected, format!("{:#}", e)))?;

        let resp = self
            .http
            .post(format!("{}/order", self.base_url))
            .headers(headers)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::execution(ExecutionFailure::Network, e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::execution(ExecutionFailure::Network, e.to_string()))?;

        if !status.is_success() {
            let reason = classify_status(status, &text);
            return Err(Error::execution(
                reason,
                format!("order placement failed: {} - {}", status, text),
            ));
        }

        let response: OrderResponse = serde_json::from_str(&text).map_err(|e| {
            Error::execution(
                ExecutionFailure::Rejected,
                format!("unreadable order response: {}", e),
            )
        })?;

        if !response.success {
            return Err(Error::execution(
                classify_message(&response.error_msg),
                format!("order not accepted: {}", response.error_msg),
            ));
        }

        info!(
            order_id = ?response.order_id,
            status = ?response.status,
            token_id,
            "Order accepted"
        );
        Ok(response)
    }

    async fn build_signed_order(
        &self,
        token_id: &str,
        side: OrderSide,
        shares: Decimal,
        price: Decimal,
    ) -> anyhow::Result<SignedOrder> {
        let maker = format!("{:?}", self.address());
        let signer = maker.clone();
        let taker = ZERO_ADDRESS.to_string();

        // BUY: maker gives USDC and takes shares. SELL: the reverse.
        let usdc = shares
            .checked_mul(price)
            .ok_or_else(|| anyhow!("Order notional overflow"))?;
        let (maker_amount, taker_amount) = match side {
            OrderSide::Buy => (to_base_units(usdc), to_base_units(shares)),
            OrderSide::Sell => (to_base_units(shares), to_base_units(usdc)),
        };

        // FOK orders never rest, so no expiration
        let expiration = "0".to_string();
        let nonce = "0".to_string();
        let fee_rate_bps = "0".to_string();
        let salt = generate_salt();

        let fields = OrderFields {
            salt: &salt,
            maker: &maker,
            signer: &signer,
            taker: &taker,
            token_id,
            maker_amount: &maker_amount,
            taker_amount: &taker_amount,
            expiration: &expiration,
            nonce: &nonce,
            fee_rate_bps: &fee_rate_bps,
            side: side.as_u8(),
        };
        let signature = self.sign_order(&fields).await?;

        Ok(SignedOrder {
            salt,
            maker,
            signer,
            taker,
            token_id: token_id.to_string(),
            maker_amount,
            taker_amount,
            side: side.as_str().to_string(),
            expiration,
            nonce,
            fee_rate_bps,
            signature_type: SignatureType::Eoa as u8,
            signature,
        })
    }

    /// Sign an order using EIP-712 typed data.
    async fn sign_order(&self, fields: &OrderFields<'_>) -> anyhow::Result<String> {
        let order_hash = fields.struct_hash()?;
        let domain_hash = self.domain_separator()?;

        // keccak256("\x19\x01" || domainSeparator || orderHash)
        let mut message = vec![0x19, 0x01];
        message.extend_from_slice(&domain_hash);
        message.extend_from_slice(&order_hash);
        let digest = alloy_primitives::keccak256(&message);

        let signature = self
            .signer
            .sign_hash(&digest)
            .await
            .context("Failed to sign order")?;

        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }

    fn domain_separator(&self) -> anyhow::Result<[u8; 32]> {
        let type_hash = alloy_primitives::keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        let name_hash = alloy_primitives::keccak256(b"Polymarket CTF Exchange");
        let version_hash = alloy_primitives::keccak256(b"1");

        let mut encoded = Vec::with_capacity(32 * 5);
        encoded.extend_from_slice(type_hash.as_slice());
        encoded.extend_from_slice(name_hash.as_slice());
        encoded.extend_from_slice(version_hash.as_slice());
        encoded.extend_from_slice(&encode_uint256(&self.chain_id.to_string())?);
        encoded.extend_from_slice(&encode_address(CTF_EXCHANGE)?);

        Ok(alloy_primitives::keccak256(&encoded).0)
    }

    /// L2 authentication headers: HMAC-SHA256 over timestamp, method, path and body.
    fn build_l2_headers(
        &self,
        method: &str,
        path: &str,
        body: Option<&str>,
    ) -> anyhow::Result<reqwest::header::HeaderMap> {
        use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign_l2_request(&self.api_secret, method, path, &timestamp, body)?;

        let mut headers = HeaderMap::new();
        let mut put = |name: &'static str, value: &str| -> anyhow::Result<()> {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_str(value)?);
            Ok(())
        };
        put("poly_address", &format!("{:?}", self.address()))?;
        put("poly_signature", &signature)?;
        put("poly_timestamp", &timestamp)?;
        put("poly_api_key", &self.api_key)?;
        put("poly_passphrase", &self.api_passphrase)?;

        Ok(headers)
    }
}

/// Fields of the EIP-712 `Order` struct.
struct OrderFields<'a> {
    salt: &'a str,
    maker: &'a str,
    signer: &'a str,
    taker: &'a str,
    token_id: &'a str,
    maker_amount: &'a str,
    taker_amount: &'a str,
    expiration: &'a str,
    nonce: &'a str,
    fee_rate_bps: &'a str,
    side: u8,
}

impl OrderFields<'_> {
    fn struct_hash(&self) -> anyhow::Result<[u8; 32]> {
        let type_hash = alloy_primitives::keccak256(
            b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)",
        );

        let mut encoded = Vec::with_capacity(32 * 13);
        encoded.extend_from_slice(type_hash.as_slice());
        encoded.extend_from_slice(&encode_uint256(self.salt)?);
        encoded.extend_from_slice(&encode_address(self.maker)?);
        encoded.extend_from_slice(&encode_address(self.signer)?);
        encoded.extend_from_slice(&encode_address(self.taker)?);
        encoded.extend_from_slice(&encode_uint256(self.token_id)?);
        encoded.extend_from_slice(&encode_uint256(self.maker_amount)?);
        encoded.extend_from_slice(&encode_uint256(self.taker_amount)?);
        encoded.extend_from_slice(&encode_uint256(self.expiration)?);
        encoded.extend_from_slice(&encode_uint256(self.nonce)?);
        encoded.extend_from_slice(&encode_uint256(self.fee_rate_bps)?);
        encoded.extend_from_slice(&encode_uint8(self.side));
        encoded.extend_from_slice(&encode_uint8(SignatureType::Eoa as u8));

        Ok(alloy_primitives::keccak256(&encoded).0)
    }
}

/// Classify a non-2xx placement response.
pub fn classify_status(status: StatusCode, body: &str) -> ExecutionFailure {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ExecutionFailure::RateLimited
    } else if status.is_server_error() {
        ExecutionFailure::Network
    } else {
        classify_message(body)
    }
}

/// Classify a venue error message.
pub fn classify_message(message: &str) -> ExecutionFailure {
    let lower = message.to_lowercase();
    if lower.contains("balance") || lower.contains("allowance") {
        ExecutionFailure::InsufficientFunds
    } else if lower.contains("rate limit") || lower.contains("too many requests") {
        ExecutionFailure::RateLimited
    } else {
        ExecutionFailure::Rejected
    }
}

/// Touch price moved by the slippage tolerance, snapped to the tick and
/// kept inside (0, 1).
fn limit_price(touch: Decimal, side: OrderSide) -> Decimal {
    let (adjusted, strategy) = match side {
        OrderSide::Buy => (touch * (Decimal::ONE + SLIPPAGE), RoundingStrategy::ToPositiveInfinity),
        OrderSide::Sell => (touch * (Decimal::ONE - SLIPPAGE), RoundingStrategy::ToNegativeInfinity),
    };
    adjusted
        .round_dp_with_strategy(2, strategy)
        .clamp(TICK, Decimal::ONE - TICK)
}

fn sign_l2_request(
    secret: &str,
    method: &str,
    path: &str,
    timestamp: &str,
    body: Option<&str>,
) -> anyhow::Result<String> {
    let message = format!("{}{}{}{}", timestamp, method, path, body.unwrap_or_default());

    let secret_bytes = base64::engine::general_purpose::URL_SAFE
        .decode(secret)
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(secret))
        .context("Invalid API secret encoding")?;

    let mut mac = Hmac::<Sha256>::new_from_slice(&secret_bytes)
        .map_err(|e| anyhow!("Failed to create HMAC: {}", e))?;
    mac.update(message.as_bytes());

    Ok(base64::engine::general_purpose::URL_SAFE.encode(mac.finalize().into_bytes()))
}

/// Convert a USDC or share amount to 6-decimal base units.
fn to_base_units(amount: Decimal) -> String {
    (amount * Decimal::from(1_000_000u64)).trunc().to_string()
}

fn encode_address(addr: &str) -> anyhow::Result<[u8; 32]> {
    let addr = Address::from_str(addr)?;
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(addr.as_slice());
    Ok(buf)
}

fn encode_uint256(value: &str) -> anyhow::Result<[u8; 32]> {
    let n = U256::from_str(value).with_context(|| format!("Invalid uint256 {}", value))?;
    Ok(n.to_be_bytes())
}

fn encode_uint8(value: u8) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[31] = value;
    buf
}

fn generate_salt() -> String {
    // Salt must fit comfortably in a JS number on the venue side
    (uuid::Uuid::new_v4().as_u128() >> 75).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn test_to_base_units() {
        assert_eq!(to_base_units(dec!(100.5)), "100500000");
        assert_eq!(to_base_units(dec!(0.0000019)), "1");
        assert_eq!(to_base_units(Decimal::ZERO), "0");
    }

    #[test]
    fn test_encode_uint8() {
        let encoded = encode_uint8(1);
        assert_eq!(encoded[31], 1);
        assert!(encoded[..31].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encode_uint256_rejects_garbage() {
        assert!(encode_uint256("12").is_ok());
        assert!(encode_uint256("not a number").is_err());
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ExecutionFailure::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, "upstream"),
            ExecutionFailure::Network
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, "not enough balance / allowance"),
            ExecutionFailure::InsufficientFunds
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, "invalid tick size"),
            ExecutionFailure::Rejected
        );
    }

    #[test]
    fn test_classify_message() {
        assert_eq!(classify_message("Insufficient Balance"), ExecutionFailure::InsufficientFunds);
        assert_eq!(classify_message("Rate limit exceeded"), ExecutionFailure::RateLimited);
        assert_eq!(classify_message("FOK order not filled"), ExecutionFailure::Rejected);
    }

    #[test]
    fn test_limit_price() {
        assert_eq!(limit_price(dec!(0.50), OrderSide::Buy), dec!(0.51));
        assert_eq!(limit_price(dec!(0.50), OrderSide::Sell), dec!(0.49));
        assert_eq!(limit_price(dec!(0.995), OrderSide::Buy), dec!(0.99));
        assert_eq!(limit_price(dec!(0.001), OrderSide::Sell), dec!(0.01));
    }

    #[test]
    fn test_order_response_parses_venue_casing() {
        let json = r#"{"success":true,"errorMsg":"","orderID":"0xabc","status":"matched","makingAmount":"5","takingAmount":"10"}"#;
        let resp: OrderResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.order_id.as_deref(), Some("0xabc"));
        assert_eq!(resp.taking_amount.as_deref(), Some("10"));
    }

    #[test]
    fn test_sign_l2_request_is_deterministic() {
        let secret = base64::engine::general_purpose::URL_SAFE.encode(b"secret");
        let a = sign_l2_request(&secret, "POST", "/order", "1700000000", Some("{}")).unwrap();
        let b = sign_l2_request(&secret, "POST", "/order", "1700000000", Some("{}")).unwrap();
        let c = sign_l2_request(&secret, "POST", "/order", "1700000001", Some("{}")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(sign_l2_request("***", "GET", "/", "1", None).is_err());
    }

    #[tokio::test]
    async fn test_signed_order_amounts() {
        let client = ClobClient::new(TEST_KEY, "key", "c2VjcmV0", "pass", 137).unwrap();

        let buy = client
            .build_signed_order("123", OrderSide::Buy, dec!(10), dec!(0.5))
            .await
            .unwrap();
        assert_eq!(buy.maker_amount, "5000000");
        assert_eq!(buy.taker_amount, "10000000");
        assert_eq!(buy.side, "BUY");
        assert!(buy.signature.starts_with("0x"));
        assert_eq!(buy.signature.len(), 2 + 130);

        let sell = client
            .build_signed_order("123", OrderSide::Sell, dec!(10), dec!(0.5))
            .await
            .unwrap();
        assert_eq!(sell.maker_amount, "10000000");
        assert_eq!(sell.taker_amount, "5000000");
    }
}
