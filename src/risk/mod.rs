// Risk management module: stop-loss / take-profit exits and trade P&L
pub mod exit_rules;

pub use exit_rules::{ExitReason, ExitRules, TradeOutcome};
