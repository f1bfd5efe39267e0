// Core modules
pub mod api;
pub mod config;
pub mod control_loop;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod logging;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use api::{MarketDataFeed, OrderExecutor};
pub use control_loop::{ControlLoop, LoopConfig, TickOutcome};
pub use error::BotError;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
