use chrono::Local;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::notify::{Notifier, NOTIFY_TARGET};

/// A log line headed for the notifier
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedLog {
    /// Bare message, used as the cooldown key
    pub key: String,
    /// Timestamped text that is actually delivered
    pub text: String,
}

/// Copies INFO and above log messages onto a channel
///
/// Events emitted under [`NOTIFY_TARGET`] are skipped so notifier failures
/// cannot feed back into the notifier.
pub struct NotifyLayer {
    tx: mpsc::UnboundedSender<ForwardedLog>,
}

impl NotifyLayer {
    pub fn new() -> (Self, LogEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, LogEvents { rx })
    }
}

impl<S: Subscriber> Layer<S> for NotifyLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > Level::INFO || meta.target().starts_with(NOTIFY_TARGET) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let Some(key) = visitor.message else {
            return;
        };

        let text = format!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), key);
        // Receiver gone means shutdown; nothing to do
        let _ = self.tx.send(ForwardedLog { key, text });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        }
    }
}

/// Receiving end of a [`NotifyLayer`]
pub struct LogEvents {
    rx: mpsc::UnboundedReceiver<ForwardedLog>,
}

impl LogEvents {
    /// Drain log lines into `notifier` until every sender is dropped
    pub fn forward_to(mut self, notifier: Arc<dyn Notifier>, cooldown: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(log) = self.rx.recv().await {
                notifier.send(&log.text, Some(&log.key), cooldown).await;
            }
        })
    }

    #[cfg(test)]
    fn try_next(&mut self) -> Option<ForwardedLog> {
        self.rx.try_recv().ok()
    }
}
