//! Process-wide tracing setup.
//!
//! Every event that passes the filter goes to stdout, to a size-rotated log
//! file, and (INFO and above) to the notifier via [`LogEvents`].

pub mod forward;
pub mod rotating;

pub use forward::{ForwardedLog, LogEvents, NotifyLayer};
pub use rotating::RotatingFile;

use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::BotError;
use crate::Result;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured filter when set. The returned
/// [`LogEvents`] should be handed to a notifier with [`LogEvents::forward_to`].
pub fn init(config: &LoggingConfig) -> Result<LogEvents> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| BotError::Config(format!("bad log filter '{}': {}", config.filter, e)))?;

    let file = RotatingFile::open(&config.file, config.max_bytes).map_err(|e| {
        BotError::Config(format!("cannot open log file {}: {}", config.file.display(), e))
    })?;

    let (notify_layer, events) = NotifyLayer::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(notify_layer)
        .try_init()
        .map_err(|e| BotError::Config(format!("logging already initialised: {}", e)))?;

    Ok(events)
}
