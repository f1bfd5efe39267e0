use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::api::{MarketDataFeed, OrderExecutor};
use crate::error::BotError;
use crate::models::{Candle, OrderReport, OrderRequest, SymbolFilters};
use crate::Result;

/// Collaborators handed to the controller on every step.
///
/// Every market and order call is bounded by `call_timeout`; a hung request
/// surfaces as a transient error.
#[derive(Clone)]
pub struct Services {
    pub market: Arc<dyn MarketDataFeed>,
    pub orders: Arc<dyn OrderExecutor>,
    pub call_timeout: Duration,
}

impl Services {
    pub fn new(
        market: Arc<dyn MarketDataFeed>,
        orders: Arc<dyn OrderExecutor>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            market,
            orders,
            call_timeout,
        }
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(BotError::Transient(format!(
                "{} timed out after {:?}",
                what, self.call_timeout
            ))),
        }
    }

    pub async fn candles(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        self.bounded("fetch candles", self.market.fetch_candles(symbol, interval, limit))
            .await
    }

    pub async fn ticker_price(&self, symbol: &str) -> Result<f64> {
        self.bounded("fetch ticker", self.market.fetch_ticker_price(symbol))
            .await
    }

    pub async fn symbol_filters(&self, symbol: &str) -> Result<SymbolFilters> {
        self.bounded("fetch filters", self.market.fetch_symbol_filters(symbol))
            .await
    }

    pub async fn asset_balance(&self, asset: &str) -> Result<f64> {
        self.bounded("fetch balance", self.market.fetch_asset_balance(asset))
            .await
    }

    pub async fn place_order(&self, order: &OrderRequest) -> Result<OrderReport> {
        self.bounded("place order", self.orders.place_market_order(order))
            .await
    }
}
