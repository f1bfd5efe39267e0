use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::NotifyConfig;
use crate::error::BotError;
use crate::notify::{CooldownTracker, Notifier, NOTIFY_TARGET};
use crate::Result;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Telegram Bot API notifier
///
/// Delivery is best effort. Failures are logged under [`NOTIFY_TARGET`] so the
/// log forwarder does not echo them back into the chat.
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    token: String,
    chat_id: String,
    cooldowns: Mutex<CooldownTracker>,
}

impl TelegramNotifier {
    pub fn new(config: &NotifyConfig, token: String, chat_id: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BotError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            chat_id,
            cooldowns: Mutex::new(CooldownTracker::new()),
        })
    }

    async fn post(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Transient(format!("Telegram HTTP {}: {}", status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str, key: Option<&str>, cooldown: Duration) {
        if let Some(key) = key {
            if !self.cooldowns.lock().await.try_acquire(key, cooldown) {
                tracing::debug!(target: NOTIFY_TARGET, key, "Notification suppressed by cooldown");
                return;
            }
        }

        if let Err(e) = self.post(message).await {
            tracing::warn!(target: NOTIFY_TARGET, "Telegram error: {}", e);
        }
    }
}
