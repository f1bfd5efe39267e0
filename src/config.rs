//! Runtime configuration.
//!
//! Defaults are compiled in, then overridden by an optional TOML file and by
//! `TRENDBOT__SECTION__KEY` environment variables. Credentials only ever come
//! from the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::BotError;
use crate::Result;

pub const ENV_PREFIX: &str = "TRENDBOT";

/// Trading pair and candle source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub interval: String,
    pub candle_limit: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbol: "AVAXUSDT".to_string(),
            base_asset: "AVAX".to_string(),
            quote_asset: "USDT".to_string(),
            interval: "15m".to_string(),
            candle_limit: 999,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub short_period: usize,
    pub long_period: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            short_period: 100,
            long_period: 200,
        }
    }
}

/// Exit thresholds and fee model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub stop_loss_pct: f64,   // 0.025 -> exit at entry * 0.975
    pub take_profit_pct: f64, // 0.065 -> exit at entry * 1.065
    pub commission: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.025,
            take_profit_pct: 0.065,
            commission: 0.001,
        }
    }
}

/// Order sizing margins
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Fraction of quote balance spent on a buy (fees and slippage reserve)
    pub buy_buffer: f64,
    /// Fraction of base balance sold on exit (fee dust reserve)
    pub sell_buffer: f64,
    /// Multiplier applied to the exchange minimum notional for buys
    pub notional_safety: f64,
    /// Minimum quote balance before an entry is attempted
    pub min_trade_quote: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            buy_buffer: 0.99,
            sell_buffer: 0.999,
            notional_safety: 1.1,
            min_trade_quote: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub poll_interval_secs: u64,
    pub backoff_secs: u64,
    pub call_timeout_secs: u64,
    pub error_log_cooldown_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            backoff_secs: 60,
            call_timeout_secs: 10,
            error_log_cooldown_secs: 300,
        }
    }
}

impl ScheduleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn error_log_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_log_cooldown_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub recv_window_ms: u64,
    pub filters_ttl_secs: u64,
    pub requests_per_minute: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            recv_window_ms: 5000,
            filters_ttl_secs: 300,
            requests_per_minute: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub base_url: String,
    pub cooldown_secs: u64,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.telegram.org".to_string(),
            cooldown_secs: 180,
            timeout_secs: 5,
        }
    }
}

impl NotifyConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: PathBuf,
    pub max_bytes: u64,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("log.txt"),
            max_bytes: 5 * 1024 * 1024,
            filter: "trendbot=info".to_string(),
        }
    }
}

/// Everything loaded once at process start
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub market: MarketConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub sizing: SizingConfig,
    pub schedule: ScheduleConfig,
    pub exchange: ExchangeConfig,
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
    pub state_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            market: MarketConfig::default(),
            strategy: StrategyConfig::default(),
            risk: RiskConfig::default(),
            sizing: SizingConfig::default(),
            schedule: ScheduleConfig::default(),
            exchange: ExchangeConfig::default(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
            state_file: PathBuf::from("state.json"),
        }
    }
}

impl Settings {
    /// Load defaults, then `path` (if it exists), then the environment
    pub fn load(path: &Path) -> Result<Self> {
        let built = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| BotError::Config(e.to_string()))?;

        let settings: Settings = built
            .try_deserialize()
            .map_err(|e| BotError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.strategy;
        if s.short_period == 0 || s.long_period == 0 {
            return Err(BotError::Config("EMA periods must be positive".into()));
        }
        if s.short_period >= s.long_period {
            return Err(BotError::Config(format!(
                "short_period ({}) must be below long_period ({})",
                s.short_period, s.long_period
            )));
        }

        let z = &self.sizing;
        for (name, value) in [("buy_buffer", z.buy_buffer), ("sell_buffer", z.sell_buffer)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(BotError::Config(format!("{} must be in (0, 1], got {}", name, value)));
            }
        }
        if z.notional_safety < 1.0 {
            return Err(BotError::Config("notional_safety must be >= 1.0".into()));
        }

        let r = &self.risk;
        if !(r.stop_loss_pct > 0.0 && r.stop_loss_pct < 1.0) || r.take_profit_pct <= 0.0 {
            return Err(BotError::Config(
                "stop_loss_pct must be in (0, 1) and take_profit_pct positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&r.commission) {
            return Err(BotError::Config("commission must be in [0, 1)".into()));
        }

        let t = &self.schedule;
        if t.poll_interval_secs == 0 || t.backoff_secs == 0 || t.call_timeout_secs == 0 {
            return Err(BotError::Config("schedule intervals must be positive".into()));
        }

        if self.state_file.as_os_str().is_empty() {
            return Err(BotError::Config("state_file must not be empty".into()));
        }

        if self.market.candle_limit == 0 || self.market.symbol.is_empty() {
            return Err(BotError::Config("market symbol and candle_limit are required".into()));
        }

        Ok(())
    }
}

/// Secrets read from the process environment (after `.env` is loaded)
#[derive(Clone, Default)]
pub struct Credentials {
    pub binance_api_key: Option<String>,
    pub binance_api_secret: Option<String>,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            binance_api_key: read("BINANCE_API_KEY"),
            binance_api_secret: read("BINANCE_API_SECRET"),
            telegram_token: read("TELEGRAM_TOKEN"),
            telegram_chat_id: read("TELEGRAM_CHAT_ID"),
        }
    }

    pub fn telegram(&self) -> Option<(String, String)> {
        Some((self.telegram_token.clone()?, self.telegram_chat_id.clone()?))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("binance_api_key", &mask(&self.binance_api_key))
            .field("binance_api_secret", &mask(&self.binance_api_secret))
            .field("telegram_token", &mask(&self.telegram_token))
            .field("telegram_chat_id", &mask(&self.telegram_chat_id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("trendbot-{}-{}", uuid::Uuid::new_v4(), name))
    }

    #[test]
    fn test_defaults_match_reference_strategy() {
        let settings = Settings::default();
        assert_eq!(settings.strategy.short_period, 100);
        assert_eq!(settings.strategy.long_period, 200);
        assert_eq!(settings.sizing.buy_buffer, 0.99);
        assert_eq!(settings.sizing.sell_buffer, 0.999);
        assert_eq!(settings.sizing.notional_safety, 1.1);
        assert_eq!(settings.schedule.poll_interval(), Duration::from_secs(60));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let settings = Settings::load(&temp_path("absent.toml")).unwrap();
        assert_eq!(settings.market.symbol, "AVAXUSDT");
        assert_eq!(settings.state_file, PathBuf::from("state.json"));
    }

    #[test]
    fn test_file_overrides_single_fields() {
        let path = temp_path("settings.toml");
        std::fs::write(
            &path,
            "state_file = \"custom.json\"\n[strategy]\nshort_period = 12\nlong_period = 26\n[sizing]\nbuy_buffer = 0.95\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.strategy.short_period, 12);
        assert_eq!(settings.strategy.long_period, 26);
        assert_eq!(settings.sizing.buy_buffer, 0.95);
        // Untouched fields keep their defaults
        assert_eq!(settings.sizing.sell_buffer, 0.999);
        assert_eq!(settings.state_file, PathBuf::from("custom.json"));
    }

    #[test]
    fn test_validate_rejects_inverted_periods() {
        let mut settings = Settings::default();
        settings.strategy.short_period = 200;
        settings.strategy.long_period = 100;
        assert!(matches!(settings.validate(), Err(BotError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_buffers() {
        let mut settings = Settings::default();
        settings.sizing.buy_buffer = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.sizing.notional_safety = 0.9;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let creds = Credentials {
            binance_api_key: Some("key".into()),
            binance_api_secret: Some("super-secret".into()),
            telegram_token: None,
            telegram_chat_id: None,
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<set>"));
        assert!(creds.telegram().is_none());
    }
}
