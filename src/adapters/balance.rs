use async_trait::async_trait;
use rust_decimal::Decimal;

use super::BalanceOracle;
use crate::api::{parse_address, PolygonClient};
use crate::error::{Error, Result};

/// Spendable USDC collateral read straight from the token contract.
pub struct PolygonBalanceOracle {
    client: PolygonClient,
}

impl PolygonBalanceOracle {
    pub fn new(client: PolygonClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BalanceOracle for PolygonBalanceOracle {
    async fn get_available_balance(&self, account: &str) -> Result<Decimal> {
        let address =
            parse_address(account).ok_or_else(|| Error::AccountNotFound(account.to_string()))?;

        self.client
            .usdc_balance(&address)
            .await
            .map_err(|e| Error::BalanceUnavailable {
                account: account.to_string(),
                message: format!("{:#}", e),
            })
    }
}
