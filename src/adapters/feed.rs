use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::OrderFeed;
use crate::api::{to_remote_order, DataClient, TradeResponse};
use crate::error::{Error, Result};
use crate::models::RemoteOrder;
use crate::trading::MarketScope;

/// Order feed over the Polymarket data API `/trades` endpoint.
pub struct DataApiFeed {
    client: DataClient,
    limit: u32,
}

impl DataApiFeed {
    pub fn new(client: DataClient, limit: u32) -> Self {
        Self { client, limit }
    }
}

#[async_trait]
impl OrderFeed for DataApiFeed {
    async fn fetch_recent_orders(
        &self,
        account: &str,
        scope: &MarketScope,
        since: DateTime<Utc>,
    ) -> Result<Vec<RemoteOrder>> {
        let trades = self
            .client
            .get_trades(account, scope.market_id(), self.limit)
            .await
            .map_err(|e| Error::FeedUnavailable(format!("{:#}", e)))?;

        let total = trades.len();
        let orders = recent_orders(trades, since);
        debug!(scope = %scope, total, recent = orders.len(), "Feed polled");

        Ok(orders)
    }
}

fn recent_orders(trades: Vec<TradeResponse>, since: DateTime<Utc>) -> Vec<RemoteOrder> {
    trades
        .into_iter()
        .filter_map(to_remote_order)
        .filter(|o| o.timestamp >= since)
        .collect()
}
