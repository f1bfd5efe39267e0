use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use trendbot::config::Settings;
use trendbot::execution::{ControllerConfig, PositionController, Services, StepOutcome, TradeState};
use trendbot::persistence::{JsonStateFile, PersistedState, StateStore};
use trendbot::risk::ExitReason;
use trendbot::strategy::SignalDetector;
use trendbot::{
    BotError, Candle, ControlLoop, Fill, LoopConfig, MarketDataFeed, OrderExecutor, OrderReport,
    OrderRequest, OrderSide, Position, Result, SymbolFilters, TickOutcome,
};

/// Exchange double driven entirely by the test
#[derive(Default)]
struct ScriptedExchange {
    candles: Mutex<Vec<Candle>>,
    /// Errors handed out by `fetch_candles` before the real data
    candle_errors: Mutex<VecDeque<BotError>>,
    candle_fetches: AtomicUsize,
    ticker: Mutex<f64>,
    balances: Mutex<Vec<(String, f64)>>,
    fills: Mutex<VecDeque<Vec<Fill>>>,
    orders: Mutex<Vec<OrderRequest>>,
    fetch_signal: Option<(usize, Arc<Notify>)>,
}

impl ScriptedExchange {
    fn set_ticker(&self, price: f64) {
        *self.ticker.lock().unwrap() = price;
    }

    fn set_balance(&self, asset: &str, free: f64) {
        let mut balances = self.balances.lock().unwrap();
        balances.retain(|(a, _)| a != asset);
        balances.push((asset.to_string(), free));
    }

    fn push_candle(&self, close: f64) {
        let mut candles = self.candles.lock().unwrap();
        let next = candles.len() as i64;
        candles.push(candle(next, close));
    }
}

#[async_trait]
impl MarketDataFeed for ScriptedExchange {
    async fn fetch_candles(&self, _: &str, _: &str, _: u32) -> Result<Vec<Candle>> {
        let count = self.candle_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, notify)) = &self.fetch_signal {
            if count >= *after {
                notify.notify_one();
            }
        }

        if let Some(err) = self.candle_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.candles.lock().unwrap().clone())
    }

    async fn fetch_ticker_price(&self, _: &str) -> Result<f64> {
        Ok(*self.ticker.lock().unwrap())
    }

    async fn fetch_symbol_filters(&self, _: &str) -> Result<SymbolFilters> {
        Ok(SymbolFilters {
            step_size: 0.01,
            min_qty: 0.1,
            min_notional: 10.0,
        })
    }

    async fn fetch_asset_balance(&self, asset: &str) -> Result<f64> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .iter()
            .find(|(a, _)| a == asset)
            .map(|(_, free)| *free)
            .unwrap_or(0.0))
    }
}

#[async_trait]
impl OrderExecutor for ScriptedExchange {
    async fn place_market_order(&self, order: &OrderRequest) -> Result<OrderReport> {
        self.orders.lock().unwrap().push(order.clone());
        let fills = self.fills.lock().unwrap().pop_front().unwrap_or_default();
        Ok(OrderReport { fills })
    }
}

fn candle(index: i64, close: f64) -> Candle {
    let start: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    Candle {
        timestamp: start + ChronoDuration::minutes(15 * index),
        close,
    }
}

fn settings(state_file: PathBuf) -> Settings {
    let mut settings = Settings::default();
    settings.strategy.short_period = 2;
    settings.strategy.long_period = 4;
    settings.schedule.poll_interval_secs = 1;
    settings.schedule.backoff_secs = 1;
    settings.state_file = state_file;
    settings
}

fn temp_state_file() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("trendbot-it-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("state.json")
}

fn build_loop(settings: &Settings, exchange: Arc<ScriptedExchange>) -> ControlLoop {
    let services = Services::new(exchange.clone(), exchange, Duration::from_secs(1));
    let detector = SignalDetector::new(settings.strategy.short_period, settings.strategy.long_period);
    let store = JsonStateFile::new(&settings.state_file);
    let controller = PositionController::new(ControllerConfig::from(settings), Box::new(store));
    ControlLoop::new(LoopConfig::from(settings), detector, controller, services)
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[tokio::test]
async fn test_crossover_trade_round_trip_with_restart() {
    let state_file = temp_state_file();
    let settings = settings(state_file.clone());

    let exchange = Arc::new(ScriptedExchange::default());
    // Flat history, a dip, then a jump: EMA2 crosses above EMA4 on the last candle
    for close in [10.0, 10.0, 10.0, 10.0, 10.0, 9.0, 12.0] {
        exchange.push_candle(close);
    }
    exchange.set_ticker(20.0);
    exchange.set_balance("USDT", 205.0);

    let mut bot = build_loop(&settings, exchange.clone());

    let outcome = bot.tick().await.unwrap();
    assert!(matches!(
        outcome,
        TickOutcome::Stepped(StepOutcome::SignalDetected { .. })
    ));

    // Same (still forming) candle: nothing happens yet
    assert_eq!(
        bot.tick().await.unwrap(),
        TickOutcome::Stepped(StepOutcome::AwaitingNextCandle)
    );
    assert!(exchange.orders.lock().unwrap().is_empty());

    // Next candle keeps EMA2 above EMA4: confirmed entry
    exchange.push_candle(13.0);
    exchange.fills.lock().unwrap().push_back(vec![
        Fill { price: 19.5, qty: 5.0 },
        Fill { price: 20.5, qty: 5.0 },
    ]);
    match bot.tick().await.unwrap() {
        TickOutcome::Stepped(StepOutcome::Entered {
            quantity,
            entry_price,
        }) => {
            assert!(approx(quantity, 10.14));
            assert!(approx(entry_price, 20.0));
        }
        other => panic!("expected entry, got {:?}", other),
    }
    {
        let orders = exchange.orders.lock().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, OrderSide::Buy);
        assert_eq!(orders[0].symbol, "AVAXUSDT");
    }

    // Position survives a restart through the state file
    let on_disk = JsonStateFile::new(&state_file).load();
    assert_eq!(
        on_disk,
        PersistedState {
            in_position: true,
            entry_price: 20.0
        }
    );
    let mut bot = build_loop(&settings, exchange.clone());
    assert_eq!(
        bot.controller().state(),
        TradeState::InPosition { entry_price: 20.0 }
    );

    exchange.set_ticker(21.0);
    assert!(matches!(
        bot.tick().await.unwrap(),
        TickOutcome::Stepped(StepOutcome::Holding { .. })
    ));

    exchange.set_ticker(21.5);
    exchange.set_balance("AVAX", 10.14);
    match bot.tick().await.unwrap() {
        TickOutcome::Stepped(StepOutcome::Exited(outcome)) => {
            assert_eq!(outcome.reason, ExitReason::TakeProfit);
            assert!(outcome.is_profit);
            // No fills reported: the ticker price stands in
            assert!(approx(outcome.exit_price, 21.5));
        }
        other => panic!("expected exit, got {:?}", other),
    }
    assert_eq!(exchange.orders.lock().unwrap()[1].side, OrderSide::Sell);
    assert_eq!(bot.controller().position(), Position::flat());
    assert_eq!(
        JsonStateFile::new(&state_file).load(),
        PersistedState::default()
    );

    std::fs::remove_dir_all(state_file.parent().unwrap()).ok();
}

#[tokio::test]
async fn test_short_history_reports_warming() {
    let settings = settings(temp_state_file());
    let exchange = Arc::new(ScriptedExchange::default());
    for close in [10.0, 11.0, 12.0] {
        exchange.push_candle(close);
    }

    let mut bot = build_loop(&settings, exchange.clone());
    assert_eq!(
        bot.tick().await.unwrap(),
        TickOutcome::Warming { have: 3, need: 6 }
    );
    assert!(exchange.orders.lock().unwrap().is_empty());

    std::fs::remove_dir_all(settings.state_file.parent().unwrap()).ok();
}

#[tokio::test]
async fn test_run_survives_feed_failures_until_shutdown() {
    let settings = settings(temp_state_file());
    let shutdown = Arc::new(Notify::new());

    let exchange = ScriptedExchange {
        fetch_signal: Some((3, shutdown.clone())),
        ..Default::default()
    };
    exchange
        .candle_errors
        .lock()
        .unwrap()
        .extend([
            BotError::Transient("connection reset".into()),
            BotError::Transient("HTTP 503".into()),
        ]);
    for close in [10.0, 10.0, 10.0, 10.0, 10.0, 10.0] {
        exchange.push_candle(close);
    }
    let exchange = Arc::new(exchange);

    let mut bot = build_loop(&settings, exchange.clone());
    let stop = shutdown.clone();
    tokio::time::timeout(Duration::from_secs(10), bot.run(async move {
        stop.notified().await;
    }))
    .await
    .expect("loop did not stop");

    assert_eq!(bot.cycles(), 3);
    assert_eq!(exchange.candle_fetches.load(Ordering::SeqCst), 3);
    assert_eq!(bot.controller().state(), TradeState::NoPosition);

    std::fs::remove_dir_all(settings.state_file.parent().unwrap()).ok();
}

#[tokio::test]
async fn test_run_stops_promptly_when_already_shut_down() {
    let settings = settings(temp_state_file());
    let exchange = Arc::new(ScriptedExchange::default());
    exchange
        .candle_errors
        .lock()
        .unwrap()
        .push_back(BotError::Transient("down".into()));

    let mut bot = build_loop(&settings, exchange);
    tokio::time::timeout(Duration::from_secs(5), bot.run(std::future::ready(())))
        .await
        .expect("loop ignored shutdown");

    assert_eq!(bot.cycles(), 1);
    std::fs::remove_dir_all(settings.state_file.parent().unwrap()).ok();
}
