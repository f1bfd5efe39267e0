use chrono::{DateTime, Utc};

use super::order_sizer::{OrderSizer, SizingRejection};
use super::services::Services;
use crate::config::{MarketConfig, Settings};
use crate::error::BotError;
use crate::models::{Candle, OrderReport, OrderRequest, OrderSide, Position};
use crate::persistence::{PersistedState, StateStore};
use crate::risk::{ExitReason, ExitRules, TradeOutcome};
use crate::strategy::{Confirmation, EmaPair, PendingSignal};
use crate::Result;

/// Where the controller is in the trade lifecycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TradeState {
    NoPosition,
    AwaitingConfirmation(PendingSignal),
    InPosition { entry_price: f64 },
}

impl TradeState {
    pub fn position(&self) -> Position {
        match *self {
            TradeState::InPosition { entry_price } => Position::open(entry_price),
            _ => Position::flat(),
        }
    }
}

/// Why a confirmed signal did not open a position
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    InsufficientBalance { balance: f64, required: f64 },
    Sizing(SizingRejection),
    OrderFailed(BotError),
}

/// What a single step did
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Flat and no crossover on the latest candle
    Idle,
    SignalDetected { candle_time: DateTime<Utc> },
    /// Latest candle is still the crossover candle
    AwaitingNextCandle,
    SignalInvalidated,
    EntrySkipped(SkipReason),
    Entered { quantity: f64, entry_price: f64 },
    Holding { price: f64, stop: f64, target: f64 },
    Exited(TradeOutcome),
    /// Exit triggered but no sell went through; the position stays tracked
    ExitFailed { reason: ExitReason, error: String },
}

/// Pair and threshold parameters the controller needs
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub market: MarketConfig,
    pub sizer: OrderSizer,
    pub rules: ExitRules,
    pub min_trade_quote: f64,
}

impl From<&Settings> for ControllerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            market: settings.market.clone(),
            sizer: OrderSizer::from(&settings.sizing),
            rules: ExitRules::from(&settings.risk),
            min_trade_quote: settings.sizing.min_trade_quote,
        }
    }
}

/// Owns the single position and every transition of it.
///
/// The state is persisted on each entry and exit before the step returns. A
/// failed write leaves the in-memory state in charge and is retried at the
/// start of every later step until it succeeds.
pub struct PositionController {
    config: ControllerConfig,
    state: TradeState,
    store: Box<dyn StateStore>,
    unsaved: bool,
}

impl PositionController {
    /// Restore the position from `store`; anything unreadable starts flat
    pub fn new(config: ControllerConfig, store: Box<dyn StateStore>) -> Self {
        let restored = store.load();
        let state = match Position::from(restored) {
            Position {
                is_open: true,
                entry_price,
            } => TradeState::InPosition { entry_price },
            _ => TradeState::NoPosition,
        };

        tracing::info!(
            in_position = restored.in_position,
            entry_price = restored.entry_price,
            "Initial state: in_position={}, entry_price={}",
            restored.in_position,
            restored.entry_price
        );

        Self {
            config,
            state,
            store,
            unsaved: false,
        }
    }

    pub fn state(&self) -> TradeState {
        self.state
    }

    pub fn position(&self) -> Position {
        self.state.position()
    }

    /// True while the last committed transition is not on disk yet
    pub fn has_unsaved_state(&self) -> bool {
        self.unsaved
    }

    /// Give the state machine one transition opportunity
    ///
    /// Errors from market calls propagate unchanged and leave the state as it
    /// was, so the same decision is re-evaluated on the next poll.
    pub async fn step(
        &mut self,
        services: &Services,
        candles: &[Candle],
        emas: &EmaPair,
    ) -> Result<StepOutcome> {
        if self.unsaved {
            self.persist();
        }

        let latest = candles.last().ok_or(BotError::InsufficientData { have: 0, need: 1 })?;

        match self.state {
            TradeState::NoPosition => {
                if emas.crossed_up() {
                    self.state = TradeState::AwaitingConfirmation(PendingSignal::new(latest.timestamp));
                    tracing::info!(
                        candle_time = %latest.timestamp,
                        "Signal formed, waiting for the candle to close"
                    );
                    Ok(StepOutcome::SignalDetected {
                        candle_time: latest.timestamp,
                    })
                } else {
                    Ok(StepOutcome::Idle)
                }
            }
            TradeState::AwaitingConfirmation(pending) => {
                match pending.evaluate(latest.timestamp, emas) {
                    Confirmation::Waiting => Ok(StepOutcome::AwaitingNextCandle),
                    Confirmation::Invalidated => {
                        self.state = TradeState::NoPosition;
                        tracing::info!("Signal invalidated");
                        Ok(StepOutcome::SignalInvalidated)
                    }
                    Confirmation::Confirmed => {
                        // One check only: a failed entry attempt, error or not, drops the signal
                        self.state = TradeState::NoPosition;
                        self.enter(services).await
                    }
                }
            }
            TradeState::InPosition { entry_price } => self.manage_exit(services, entry_price).await,
        }
    }

    async fn enter(&mut self, services: &Services) -> Result<StepOutcome> {
        let market = &self.config.market;
        let quote_balance = services.asset_balance(&market.quote_asset).await?;
        let price = services.ticker_price(&market.symbol).await?;

        if quote_balance < self.config.min_trade_quote {
            tracing::info!(
                balance = quote_balance,
                required = self.config.min_trade_quote,
                "Insufficient balance: {:.2} {}",
                quote_balance,
                market.quote_asset
            );
            return Ok(StepOutcome::EntrySkipped(SkipReason::InsufficientBalance {
                balance: quote_balance,
                required: self.config.min_trade_quote,
            }));
        }

        let filters = services.symbol_filters(&market.symbol).await?;
        let quantity = match self.config.sizer.size_buy(&filters, quote_balance, price) {
            Ok(qty) => qty,
            Err(rejection) => {
                tracing::info!(?rejection, "Insufficient balance for a compliant order");
                return Ok(StepOutcome::EntrySkipped(SkipReason::Sizing(rejection)));
            }
        };

        let order = OrderRequest {
            symbol: market.symbol.clone(),
            side: OrderSide::Buy,
            quantity,
            reference_price: price,
        };

        let report = match services.place_order(&order).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "Buy order failed, staying flat");
                return Ok(StepOutcome::EntrySkipped(SkipReason::OrderFailed(e)));
            }
        };

        let entry_price = fill_price_or(&report, price);
        self.state = TradeState::InPosition { entry_price };
        self.persist();

        tracing::info!(
            quantity,
            entry_price,
            "Bought {} {} @ {}",
            quantity,
            self.config.market.base_asset,
            entry_price
        );

        Ok(StepOutcome::Entered {
            quantity,
            entry_price,
        })
    }

    async fn manage_exit(&mut self, services: &Services, entry_price: f64) -> Result<StepOutcome> {
        let rules = self.config.rules;
        let price = services.ticker_price(&self.config.market.symbol).await?;
        let stop = rules.stop_price(entry_price);
        let target = rules.target_price(entry_price);

        let Some(reason) = rules.check(entry_price, price) else {
            tracing::debug!(price, stop, target, "Holding position");
            return Ok(StepOutcome::Holding {
                price,
                stop,
                target,
            });
        };

        let market = &self.config.market;
        let base_balance = services.asset_balance(&market.base_asset).await?;
        let filters = services.symbol_filters(&market.symbol).await?;

        let quantity = match self.config.sizer.size_sell(&filters, base_balance) {
            Ok(qty) => qty,
            Err(rejection) => {
                tracing::warn!(
                    ?rejection,
                    "Not enough {} to sell ({}), position kept",
                    market.base_asset,
                    base_balance
                );
                return Ok(StepOutcome::ExitFailed {
                    reason,
                    error: format!("{:?}", rejection),
                });
            }
        };

        tracing::info!(
            %reason,
            "Sell signal: price {}, target {}, stop {}",
            price,
            target,
            stop
        );

        let order = OrderRequest {
            symbol: market.symbol.clone(),
            side: OrderSide::Sell,
            quantity,
            reference_price: price,
        };

        let report = match services.place_order(&order).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "Sell order failed, will retry next poll");
                return Ok(StepOutcome::ExitFailed {
                    reason,
                    error: e.to_string(),
                });
            }
        };

        let exit_price = fill_price_or(&report, price);
        let outcome = rules.outcome(entry_price, exit_price, quantity, reason);

        self.state = TradeState::NoPosition;
        self.persist();

        tracing::info!(
            pnl = outcome.pnl,
            %reason,
            "{}: sold {} {} @ {} | PnL: {:.3}",
            outcome.label(),
            quantity,
            self.config.market.base_asset,
            exit_price,
            outcome.pnl
        );

        Ok(StepOutcome::Exited(outcome))
    }

    fn persist(&mut self) {
        let snapshot = PersistedState::from(self.state.position());
        match self.store.save(&snapshot) {
            Ok(()) => {
                if self.unsaved {
                    tracing::info!("State written after earlier failure");
                }
                self.unsaved = false;
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not save state, will retry next cycle");
                self.unsaved = true;
            }
        }
    }
}

fn fill_price_or(report: &OrderReport, fallback: f64) -> f64 {
    report.average_fill_price().unwrap_or(fallback)
}
