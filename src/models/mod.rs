use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed (or currently forming) candle reduced to what the strategy reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

/// Exchange-declared trading constraints for a pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub step_size: f64,
    pub min_qty: f64,
    pub min_notional: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market order to submit.
///
/// `reference_price` is the price observed when the order was sized; the
/// executor uses it for the minimum-notional pre-check.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub reference_price: f64,
}

/// Partial execution of an order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub price: f64,
    pub qty: f64,
}

/// What the exchange reported back for an executed order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderReport {
    pub fills: Vec<Fill>,
}

impl OrderReport {
    /// Volume-weighted average fill price, `None` when nothing was reported
    pub fn average_fill_price(&self) -> Option<f64> {
        let total_qty: f64 = self.fills.iter().map(|f| f.qty).sum();
        if self.fills.is_empty() || total_qty <= 0.0 {
            return None;
        }

        let notional: f64 = self.fills.iter().map(|f| f.price * f.qty).sum();
        Some(notional / total_qty)
    }

    pub fn filled_quantity(&self) -> f64 {
        self.fills.iter().map(|f| f.qty).sum()
    }
}

/// The single tracked position.
///
/// `entry_price > 0` exactly when `is_open` is true.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub is_open: bool,
    pub entry_price: f64,
}

impl Position {
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn open(entry_price: f64) -> Self {
        Self {
            is_open: true,
            entry_price,
        }
    }
}
