use async_trait::async_trait;
use chrono::DateTime;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{MarketDataFeed, OrderExecutor};
use crate::config::{Credentials, ExchangeConfig};
use crate::error::BotError;
use crate::models::{Candle, Fill, OrderReport, OrderRequest, SymbolFilters};
use crate::Result;

/// Used when the exchange declares no notional filter for a symbol
const DEFAULT_MIN_NOTIONAL: f64 = 10.0;

type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerTime {
    server_time: i64,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    #[serde(default)]
    filters: Vec<RawFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum RawFilter {
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { step_size: String, min_qty: String },
    #[serde(rename = "NOTIONAL", rename_all = "camelCase")]
    Notional { min_notional: String },
    #[serde(rename = "MIN_NOTIONAL", rename_all = "camelCase")]
    MinNotional { min_notional: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<RawBalance>,
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(default)]
    fills: Vec<RawFill>,
}

#[derive(Debug, Deserialize)]
struct RawFill {
    price: String,
    qty: String,
}

/// Binance spot REST client
///
/// Public market data needs no credentials; account and order endpoints are
/// signed with HMAC-SHA256. Symbol filters are cached for a configurable TTL
/// and dropped whenever an order is rejected.
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    recv_window_ms: u64,
    time_offset_ms: AtomicI64,
    filters_ttl: Duration,
    filters: Mutex<HashMap<String, (SymbolFilters, Instant)>>,
    rate_limiter: Arc<DirectRateLimiter>,
}

impl BinanceClient {
    pub fn new(
        config: &ExchangeConfig,
        credentials: &Credentials,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BotError::Config(format!("failed to build HTTP client: {}", e)))?;

        let rpm = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: credentials.binance_api_key.clone(),
            api_secret: credentials.binance_api_secret.clone(),
            recv_window_ms: config.recv_window_ms,
            time_offset_ms: AtomicI64::new(0),
            filters_ttl: Duration::from_secs(config.filters_ttl_secs),
            filters: Mutex::new(HashMap::new()),
            rate_limiter,
        })
    }

    /// Measure `local - server` clock skew and apply it to signed requests
    pub async fn sync_time_offset(&self) -> Result<i64> {
        let url = format!("{}/api/v3/time", self.base_url);
        self.rate_limiter.until_ready().await;
        let response = self.client.get(&url).send().await?;
        let server: ServerTime = decode(response).await?;

        let offset = local_millis() - server.server_time;
        self.time_offset_ms.store(offset, Ordering::Relaxed);
        tracing::info!(offset_ms = offset, "Clock offset: {} ms", offset);
        Ok(offset)
    }

    pub fn time_offset_ms(&self) -> i64 {
        self.time_offset_ms.load(Ordering::Relaxed)
    }

    /// Non-zero free balances of the account
    pub async fn fetch_balances(&self) -> Result<Vec<(String, f64)>> {
        let account = self.account().await?;
        let mut balances = Vec::new();
        for balance in account.balances {
            let free = parse_f64(&balance.free, "free balance")?;
            if free > 0.0 {
                balances.push((balance.asset, free));
            }
        }
        Ok(balances)
    }

    /// Forget cached filters so the next lookup hits the exchange
    pub fn invalidate_filters(&self, symbol: &str) {
        if let Ok(mut cache) = self.filters.lock() {
            cache.remove(symbol);
        }
    }

    async fn account(&self) -> Result<AccountInfo> {
        self.signed(Method::GET, "/api/v3/account", Vec::new()).await
    }

    async fn public<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        self.rate_limiter.until_ready().await;
        let response = self.client.get(&url).query(query).send().await?;
        decode(response).await
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> Result<T> {
        let (api_key, secret) = match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => (key, secret),
            _ => return Err(BotError::Config("Binance API credentials are not set".into())),
        };

        params.push(("timestamp", (local_millis() - self.time_offset_ms()).to_string()));
        params.push(("recvWindow", self.recv_window_ms.to_string()));

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let signature = sign(secret, &query)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await?;
        decode(response).await
    }

    async fn load_filters(&self, symbol: &str) -> Result<SymbolFilters> {
        let info: ExchangeInfo = self
            .public("/api/v3/exchangeInfo", &[("symbol", symbol.to_string())])
            .await?;

        let symbol_info = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| BotError::Rejected(format!("unknown symbol {}", symbol)))?;

        parse_filters(symbol, &symbol_info.filters)
    }
}

#[async_trait]
impl MarketDataFeed for BinanceClient {
    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let rows: Vec<Vec<serde_json::Value>> = self
            .public(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        rows.iter().map(|row| parse_kline(row)).collect()
    }

    async fn fetch_ticker_price(&self, symbol: &str) -> Result<f64> {
        let ticker: TickerPrice = self
            .public("/api/v3/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        parse_f64(&ticker.price, "ticker price")
    }

    async fn fetch_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters> {
        if let Ok(cache) = self.filters.lock() {
            if let Some((filters, fetched_at)) = cache.get(symbol) {
                if fetched_at.elapsed() < self.filters_ttl {
                    return Ok(*filters);
                }
            }
        }

        let filters = self.load_filters(symbol).await?;
        if let Ok(mut cache) = self.filters.lock() {
            cache.insert(symbol.to_string(), (filters, Instant::now()));
        }
        tracing::debug!(symbol, ?filters, "Refreshed symbol filters");
        Ok(filters)
    }

    async fn fetch_asset_balance(&self, asset: &str) -> Result<f64> {
        let account = self.account().await?;
        match account.balances.iter().find(|b| b.asset == asset) {
            Some(balance) => parse_f64(&balance.free, "free balance"),
            None => Ok(0.0),
        }
    }
}

#[async_trait]
impl OrderExecutor for BinanceClient {
    async fn place_market_order(&self, order: &OrderRequest) -> Result<OrderReport> {
        let filters = self.fetch_symbol_filters(&order.symbol).await?;

        let notional = order.quantity * order.reference_price;
        if notional < filters.min_notional {
            return Err(BotError::Rejected(format!(
                "notional {:.4} below minimum {}",
                notional, filters.min_notional
            )));
        }

        let quantity = format_quantity(order.quantity, filters.step_size)?;
        let params = vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.clone()),
            ("newOrderRespType", "FULL".to_string()),
            ("newClientOrderId", uuid::Uuid::new_v4().simple().to_string()),
        ];

        let response: OrderResponse = match self.signed(Method::POST, "/api/v3/order", params).await {
            Ok(response) => response,
            Err(e) => {
                if matches!(e, BotError::Rejected(_)) {
                    self.invalidate_filters(&order.symbol);
                }
                return Err(e);
            }
        };

        let fills = response
            .fills
            .iter()
            .map(|f| {
                Ok(Fill {
                    price: parse_f64(&f.price, "fill price")?,
                    qty: parse_f64(&f.qty, "fill qty")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            symbol = %order.symbol,
            side = %order.side,
            %quantity,
            fills = fills.len(),
            "Market order executed"
        );

        Ok(OrderReport { fills })
    }
}

/// Turn an HTTP response into `T` or a classified error
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        let body = response.text().await?;
        return Ok(serde_json::from_str(&body)?);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<ApiError>(&body) {
        Ok(api) => format!("{} (code {})", api.msg, api.code),
        Err(_) => body,
    };

    if is_transient_status(status) {
        Err(BotError::Transient(format!("HTTP {}: {}", status, detail)))
    } else {
        Err(BotError::Rejected(format!("HTTP {}: {}", status, detail)))
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.as_u16() == 418
        || status == StatusCode::REQUEST_TIMEOUT
}

fn sign(secret: &str, payload: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| BotError::Config(format!("invalid API secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn local_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn parse_f64(raw: &str, what: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|e| BotError::Transient(format!("bad {} '{}': {}", what, raw, e)))
}

fn parse_kline(row: &[serde_json::Value]) -> Result<Candle> {
    let open_time = row
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| BotError::Transient("kline without open time".into()))?;
    let close = row
        .get(4)
        .and_then(|v| v.as_str())
        .ok_or_else(|| BotError::Transient("kline without close price".into()))?;

    let timestamp = DateTime::from_timestamp_millis(open_time)
        .ok_or_else(|| BotError::Transient(format!("kline time out of range: {}", open_time)))?;

    Ok(Candle {
        timestamp,
        close: parse_f64(close, "close price")?,
    })
}

fn parse_filters(symbol: &str, raw: &[RawFilter]) -> Result<SymbolFilters> {
    let mut lot_size = None;
    let mut min_notional = None;

    for filter in raw {
        match filter {
            RawFilter::LotSize { step_size, min_qty } => {
                lot_size = Some((parse_f64(step_size, "stepSize")?, parse_f64(min_qty, "minQty")?));
            }
            RawFilter::Notional { min_notional: value }
            | RawFilter::MinNotional { min_notional: value } => {
                min_notional = Some(parse_f64(value, "minNotional")?);
            }
            RawFilter::Other => {}
        }
    }

    let (step_size, min_qty) = lot_size
        .ok_or_else(|| BotError::Rejected(format!("{} has no LOT_SIZE filter", symbol)))?;

    Ok(SymbolFilters {
        step_size,
        min_qty,
        min_notional: min_notional.unwrap_or(DEFAULT_MIN_NOTIONAL),
    })
}

/// Decimal places implied by a step such as `0.01`
fn step_precision(step: f64) -> u32 {
    let rendered = format!("{}", step);
    rendered
        .split_once('.')
        .map(|(_, frac)| frac.trim_end_matches('0').len() as u32)
        .unwrap_or(0)
}

/// Render `qty` with exactly the step's precision, without float noise
fn format_quantity(qty: f64, step: f64) -> Result<String> {
    let value = Decimal::from_str(&format!("{}", qty))
        .map_err(|e| BotError::Rejected(format!("unrepresentable quantity {}: {}", qty, e)))?;
    Ok(value.round_dp(step_precision(step)).normalize().to_string())
}
