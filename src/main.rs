use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use trendbot::api::{BinanceClient, TelegramNotifier};
use trendbot::config::{Credentials, Settings};
use trendbot::execution::{ControllerConfig, PositionController, Services};
use trendbot::notify::{Notifier, NullNotifier};
use trendbot::persistence::JsonStateFile;
use trendbot::strategy::SignalDetector;
use trendbot::{logging, ControlLoop, LoopConfig};

/// EMA crossover spot trading bot
#[derive(Debug, Parser)]
#[command(name = "trendbot", version, about)]
struct Args {
    /// TOML settings file (optional; defaults apply when missing)
    #[arg(long, default_value = "trendbot.toml")]
    config: PathBuf,

    /// Override the state file location
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Check connectivity, balances and indicators, then exit
    #[arg(long)]
    dry_check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut settings = Settings::load(&args.config)
        .with_context(|| format!("loading settings from {}", args.config.display()))?;
    if let Some(path) = args.state_file {
        settings.state_file = path;
    }
    let credentials = Credentials::from_env();

    let log_events = logging::init(&settings.logging)?;
    tracing::info!("🚀 trendbot starting");
    tracing::debug!(?settings, ?credentials, "Loaded configuration");

    let notifier: Arc<dyn Notifier> = match credentials.telegram() {
        Some((token, chat_id)) => Arc::new(TelegramNotifier::new(&settings.notify, token, chat_id)?),
        None => {
            tracing::warn!("TELEGRAM_TOKEN/TELEGRAM_CHAT_ID not set, notifications disabled");
            Arc::new(NullNotifier)
        }
    };
    let forwarder = log_events.forward_to(notifier, settings.notify.cooldown());

    let client = Arc::new(BinanceClient::new(
        &settings.exchange,
        &credentials,
        settings.schedule.call_timeout(),
    )?);

    if let Err(e) = client.sync_time_offset().await {
        tracing::warn!("Could not sync exchange clock, using local time: {}", e);
    }
    log_wallet(&client).await;

    let services = Services::new(client.clone(), client, settings.schedule.call_timeout());
    let detector = SignalDetector::new(settings.strategy.short_period, settings.strategy.long_period);

    if args.dry_check {
        dry_check(&settings, &services, &detector).await?;
        return Ok(());
    }

    let store = JsonStateFile::new(&settings.state_file);
    let controller = PositionController::new(ControllerConfig::from(&settings), Box::new(store));

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {} ({})", settings.market.symbol, settings.market.interval);
    tracing::info!(
        "  EMA: {}/{}",
        settings.strategy.short_period,
        settings.strategy.long_period
    );
    tracing::info!(
        "  Stop loss: {}% | Take profit: {}%",
        settings.risk.stop_loss_pct * 100.0,
        settings.risk.take_profit_pct * 100.0
    );
    tracing::info!("  State file: {}", settings.state_file.display());

    let mut control_loop =
        ControlLoop::new(LoopConfig::from(&settings), detector, controller, services);

    control_loop
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        })
        .await;

    // Give queued notifications a moment to go out
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    forwarder.abort();
    Ok(())
}

async fn log_wallet(client: &BinanceClient) {
    match client.fetch_balances().await {
        Ok(balances) if balances.is_empty() => tracing::info!("Wallet is empty"),
        Ok(balances) => {
            tracing::info!("Wallet balances:");
            for (asset, free) in balances {
                tracing::info!("  {}: {}", asset, free);
            }
        }
        Err(e) => tracing::warn!("Could not read wallet balances: {}", e),
    }
}

async fn dry_check(
    settings: &Settings,
    services: &Services,
    detector: &SignalDetector,
) -> anyhow::Result<()> {
    let market = &settings.market;

    let filters = services.symbol_filters(&market.symbol).await?;
    tracing::info!(
        "Filters for {}: step={} min_qty={} min_notional={}",
        market.symbol,
        filters.step_size,
        filters.min_qty,
        filters.min_notional
    );

    let price = services.ticker_price(&market.symbol).await?;
    tracing::info!("Current price: {}", price);

    let candles = services
        .candles(&market.symbol, &market.interval, market.candle_limit)
        .await?;
    match detector.detect(&candles) {
        Ok(emas) => {
            if let Some((short, long)) = emas.latest() {
                tracing::info!(
                    "EMA{}={:.4} EMA{}={:.4} crossed_up={}",
                    detector.short_period,
                    short,
                    detector.long_period,
                    long,
                    emas.crossed_up()
                );
            }
        }
        Err(e) => tracing::warn!("Indicators unavailable: {}", e),
    }

    tracing::info!("✅ Dry check complete");
    Ok(())
}
