use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::config::Settings;
use crate::error::BotError;
use crate::execution::{PositionController, Services, StepOutcome};
use crate::notify::CooldownTracker;
use crate::strategy::SignalDetector;
use crate::Result;

/// Suppresses repeats of the same log key inside a cooldown window
#[derive(Debug)]
pub struct LogLimiter {
    tracker: CooldownTracker,
    cooldown: Duration,
}

impl LogLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            tracker: CooldownTracker::new(),
            cooldown,
        }
    }

    /// Log `message` at ERROR unless `key` fired recently; returns whether it was logged
    pub fn error(&mut self, key: &str, message: impl Display) -> bool {
        let allowed = self.tracker.try_acquire(key, self.cooldown);
        if allowed {
            tracing::error!(key, "{}", message);
        }
        allowed
    }

    pub fn warn(&mut self, key: &str, message: impl Display) -> bool {
        let allowed = self.tracker.try_acquire(key, self.cooldown);
        if allowed {
            tracing::warn!(key, "{}", message);
        }
        allowed
    }
}

/// Poll parameters for one symbol
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub symbol: String,
    pub interval: String,
    pub candle_limit: u32,
    pub poll_interval: Duration,
    pub backoff: Duration,
    pub error_log_cooldown: Duration,
}

impl From<&Settings> for LoopConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            symbol: settings.market.symbol.clone(),
            interval: settings.market.interval.clone(),
            candle_limit: settings.market.candle_limit,
            poll_interval: settings.schedule.poll_interval(),
            backoff: settings.schedule.backoff(),
            error_log_cooldown: settings.schedule.error_log_cooldown(),
        }
    }
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Not enough history yet
    Warming { have: usize, need: usize },
    Stepped(StepOutcome),
}

/// Sequential poll loop: fetch, detect, act, sleep. Never exits on a failed cycle.
pub struct ControlLoop {
    config: LoopConfig,
    detector: SignalDetector,
    controller: PositionController,
    services: Services,
    limiter: LogLimiter,
    cycles: u64,
}

impl ControlLoop {
    pub fn new(
        config: LoopConfig,
        detector: SignalDetector,
        controller: PositionController,
        services: Services,
    ) -> Self {
        let limiter = LogLimiter::new(config.error_log_cooldown);
        Self {
            config,
            detector,
            controller,
            services,
            limiter,
            cycles: 0,
        }
    }

    pub fn controller(&self) -> &PositionController {
        &self.controller
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// One poll cycle. Every error is returned to the caller untouched.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        self.cycles += 1;

        let candles = self
            .services
            .candles(&self.config.symbol, &self.config.interval, self.config.candle_limit)
            .await?;

        let emas = match self.detector.detect(&candles) {
            Ok(emas) => emas,
            Err(BotError::InsufficientData { have, need }) => {
                tracing::debug!(have, need, "Collecting data...");
                return Ok(TickOutcome::Warming { have, need });
            }
            Err(e) => return Err(e),
        };

        let outcome = self.controller.step(&self.services, &candles, &emas).await?;
        tracing::debug!(cycle = self.cycles, ?outcome, "Cycle complete");

        Ok(TickOutcome::Stepped(outcome))
    }

    /// Run until `shutdown` resolves.
    ///
    /// Shutdown is only observed between cycles, so an order in flight is
    /// never abandoned half way.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            symbol = %self.config.symbol,
            interval = %self.config.interval,
            "Bot started"
        );

        loop {
            let delay = match self.tick().await {
                Ok(_) => self.config.poll_interval,
                Err(e) => {
                    self.report_failure(&e);
                    self.config.backoff
                }
            };

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = sleep(delay) => {}
            }
        }

        tracing::info!(cycles = self.cycles, "Bot stopped");
    }

    fn report_failure(&mut self, error: &BotError) {
        self.limiter
            .error(error.log_key(), format_args!("Error - loop: {}", error));

        if error.is_transient() {
            self.limiter.warn(
                "connection_wait",
                format_args!(
                    "Connection may be down. Waiting {} seconds...",
                    self.config.backoff.as_secs()
                ),
            );
        }
    }
}
