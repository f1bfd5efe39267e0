use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::RiskConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => f.write_str("stop-loss"),
            ExitReason::TakeProfit => f.write_str("take-profit"),
        }
    }
}

/// Fixed stop-loss / take-profit thresholds relative to the entry price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitRules {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub commission: f64,
}

impl Default for ExitRules {
    fn default() -> Self {
        Self::from(&RiskConfig::default())
    }
}

impl From<&RiskConfig> for ExitRules {
    fn from(config: &RiskConfig) -> Self {
        Self {
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
            commission: config.commission,
        }
    }
}

impl ExitRules {
    pub fn stop_price(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 - self.stop_loss_pct)
    }

    pub fn target_price(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 + self.take_profit_pct)
    }

    /// Returns the exit trigger, if any. Both bounds are inclusive.
    pub fn check(&self, entry_price: f64, current_price: f64) -> Option<ExitReason> {
        if current_price <= self.stop_price(entry_price) {
            Some(ExitReason::StopLoss)
        } else if current_price >= self.target_price(entry_price) {
            Some(ExitReason::TakeProfit)
        } else {
            None
        }
    }

    /// Per-unit realized P&L with commission charged on both legs
    pub fn realized_pnl(&self, entry_price: f64, exit_price: f64) -> f64 {
        let buy_cost = entry_price * (1.0 + self.commission);
        let sell_proceeds = exit_price * (1.0 - self.commission);
        sell_proceeds - buy_cost
    }

    pub fn outcome(
        &self,
        entry_price: f64,
        exit_price: f64,
        quantity: f64,
        reason: ExitReason,
    ) -> TradeOutcome {
        TradeOutcome {
            entry_price,
            exit_price,
            quantity,
            pnl: self.realized_pnl(entry_price, exit_price),
            is_profit: exit_price >= entry_price,
            reason,
        }
    }
}

/// Summary of a completed round trip, for logging only
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeOutcome {
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub pnl: f64,
    pub is_profit: bool,
    pub reason: ExitReason,
}

impl TradeOutcome {
    pub fn label(&self) -> &'static str {
        if self.is_profit {
            "Profit"
        } else {
            "Loss"
        }
    }
}
