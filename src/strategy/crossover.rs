use crate::error::BotError;
use crate::indicators::calculate_ema_series;
use crate::models::Candle;
use crate::Result;

/// Fast and slow EMA series computed over the same candles
#[derive(Debug, Clone, PartialEq)]
pub struct EmaPair {
    pub short: Vec<f64>,
    pub long: Vec<f64>,
}

impl EmaPair {
    /// Upward cross on the last two points: strictly below, then strictly above
    pub fn crossed_up(&self) -> bool {
        let n = self.short.len();
        if n < 2 || self.long.len() != n {
            return false;
        }

        self.short[n - 2] < self.long[n - 2] && self.short[n - 1] > self.long[n - 1]
    }

    /// Whether the fast EMA is strictly above the slow one on the latest candle
    pub fn short_above_long(&self) -> bool {
        match (self.short.last(), self.long.last()) {
            (Some(short), Some(long)) => short > long,
            _ => false,
        }
    }

    pub fn latest(&self) -> Option<(f64, f64)> {
        Some((*self.short.last()?, *self.long.last()?))
    }
}

/// Moving-average crossover detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalDetector {
    pub short_period: usize,
    pub long_period: usize,
}

impl SignalDetector {
    pub fn new(short_period: usize, long_period: usize) -> Self {
        Self {
            short_period,
            long_period,
        }
    }

    /// Candles required before a crossover can be evaluated
    pub fn min_candles_required(&self) -> usize {
        self.long_period + 2
    }

    /// Compute both EMA series over the closing prices
    ///
    /// Fails with [`BotError::InsufficientData`] when the series is shorter
    /// than `long_period + 2`; callers treat that as "wait", not as an error.
    pub fn detect(&self, candles: &[Candle]) -> Result<EmaPair> {
        let need = self.min_candles_required();
        if candles.len() < need {
            return Err(BotError::InsufficientData {
                have: candles.len(),
                need,
            });
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        Ok(EmaPair {
            short: calculate_ema_series(&closes, self.short_period),
            long: calculate_ema_series(&closes, self.long_period),
        })
    }
}
