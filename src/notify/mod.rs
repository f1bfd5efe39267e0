// Best-effort operator notifications with per-key cooldowns
pub mod cooldown;

pub use cooldown::CooldownTracker;

use async_trait::async_trait;
use std::time::Duration;

/// tracing target used by notifier implementations; the log forwarder skips it
pub const NOTIFY_TARGET: &str = "trendbot::notify";

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `message` unless `key` was used within `cooldown`.
    ///
    /// Never fails: transport problems are logged and swallowed.
    async fn send(&self, message: &str, key: Option<&str>, cooldown: Duration);
}

/// Used when no notification channel is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, _message: &str, _key: Option<&str>, _cooldown: Duration) {}
}
