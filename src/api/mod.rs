pub mod binance;
pub mod telegram;

pub use binance::BinanceClient;
pub use telegram::TelegramNotifier;

use async_trait::async_trait;

use crate::models::{Candle, OrderReport, OrderRequest, SymbolFilters};
use crate::Result;

/// Read-only market and account access
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Candles oldest first; the last one may still be forming
    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>>;

    async fn fetch_ticker_price(&self, symbol: &str) -> Result<f64>;

    async fn fetch_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters>;

    /// Free balance of `asset`, 0.0 when the account holds none
    async fn fetch_asset_balance(&self, asset: &str) -> Result<f64>;
}

/// Order submission
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Submit a market order.
    ///
    /// Implementations must refuse (with `BotError::Rejected`) orders whose
    /// `quantity * reference_price` is below the exchange minimum notional
    /// without contacting the exchange.
    async fn place_market_order(&self, order: &OrderRequest) -> Result<OrderReport>;
}
