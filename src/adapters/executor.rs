use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::info;

use super::OrderExecutor;
use crate::api::{ClobClient, PlacedOrder};
use crate::error::{Error, ExecutionFailure, Result};
use crate::models::{OrderRequest, OrderResult, OrderSide};

/// Places fill-or-kill orders on the Polymarket CLOB.
pub struct ClobExecutor {
    client: ClobClient,
}

impl ClobExecutor {
    pub fn new(client: ClobClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrderExecutor for ClobExecutor {
    async fn place_order(&self, account: &str, request: &OrderRequest) -> Result<OrderResult> {
        let shares = shares_for(request)?;

        info!(
            account,
            market = %request.market_id,
            side = %request.side,
            notional = %request.notional,
            %shares,
            "Submitting order"
        );

        let placed = self
            .client
            .market_order(&request.asset_id, request.side, shares, request.reference_price)
            .await?;

        Ok(fill_result(request.side, placed))
    }
}

/// Logs orders instead of sending them and reports a fill at the reference price.
pub struct DryRunExecutor;

#[async_trait]
impl OrderExecutor for DryRunExecutor {
    async fn place_order(&self, account: &str, request: &OrderRequest) -> Result<OrderResult> {
        let shares = shares_for(request)?;

        info!(
            account,
            market = %request.market_id,
            side = %request.side,
            notional = %request.notional,
            %shares,
            price = %request.reference_price,
            "[DRY RUN] Would place order"
        );

        Ok(OrderResult {
            order_id: format!("dry-run-{}", uuid::Uuid::new_v4()),
            filled_size: shares,
            avg_price: request.reference_price,
        })
    }
}

/// Outcome-token quantity for a USDC notional, truncated to 2 decimals.
fn shares_for(request: &OrderRequest) -> Result<Decimal> {
    if request.reference_price <= Decimal::ZERO {
        return Err(Error::execution(
            ExecutionFailure::Rejected,
            format!("invalid reference price {}", request.reference_price),
        ));
    }

    let shares = request
        .notional
        .checked_div(request.reference_price)
        .ok_or_else(|| Error::execution(ExecutionFailure::Rejected, "order size overflow"))?
        .round_dp_with_strategy(2, RoundingStrategy::ToZero);

    if shares <= Decimal::ZERO {
        return Err(Error::execution(
            ExecutionFailure::Rejected,
            format!(
                "{} USDC at {} is less than 0.01 shares",
                request.notional, request.reference_price
            ),
        ));
    }

    Ok(shares)
}

fn fill_result(side: OrderSide, placed: PlacedOrder) -> OrderResult {
    // Shares are what the maker takes on a BUY and gives on a SELL
    let matched = match side {
        OrderSide::Buy => placed.response.taking_amount.as_deref(),
        OrderSide::Sell => placed.response.making_amount.as_deref(),
    };
    let filled_size = matched
        .and_then(|s| Decimal::from_str(s).ok())
        .filter(|d| *d > Decimal::ZERO)
        .unwrap_or(placed.shares);

    OrderResult {
        order_id: placed.response.order_id.unwrap_or_default(),
        filled_size,
        avg_price: placed.price,
    }
}
