use thiserror::Error;

/// Failure taxonomy for everything the trading core touches.
///
/// The control loop retries every variant on the next cycle; the split only
/// decides how loudly a failure is reported and whether cached exchange data
/// should be dropped.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BotError {
    /// Network failure, timeout, exchange overload or an undecodable response
    #[error("transient failure: {0}")]
    Transient(String),

    /// The exchange (or our own pre-check) refused an order
    #[error("order rejected: {0}")]
    Rejected(String),

    /// State file could not be read or written
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Not enough candles yet; the caller waits instead of failing
    #[error("insufficient data: {have} candles, need {need}")]
    InsufficientData { have: usize, need: usize },
}

impl BotError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BotError::Transient(_) | BotError::InsufficientData { .. })
    }

    /// Stable key used to rate-limit repeated log lines for the same failure kind
    pub fn log_key(&self) -> &'static str {
        match self {
            BotError::Transient(_) => "transient_error",
            BotError::Rejected(_) => "order_rejected",
            BotError::Persistence(_) => "persistence_error",
            BotError::Config(_) => "config_error",
            BotError::InsufficientData { .. } => "insufficient_data",
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        BotError::Transient(e.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(e: serde_json::Error) -> Self {
        BotError::Transient(format!("malformed payload: {}", e))
    }
}

impl From<tokio::time::error::Elapsed> for BotError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        BotError::Transient("call timed out".to_string())
    }
}
