//! KEEPER: reward-band maker order keeper
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the market-data feed into the paper exchange, checks
//! connectivity with one snapshot and runs the cycle controller until
//! Ctrl+C.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use keeper::config;
use keeper::engine::CycleController;
use keeper::exchange::coinone::CoinoneMarketData;
use keeper::exchange::paper::PaperExchange;
use keeper::exchange::ExchangeGateway;
use keeper::market::SnapshotReader;

const BANNER: &str = r#"
 _  _______ _____ ____  _____ ____
| |/ / ____| ____|  _ \| ____|  _ \
| ' /|  _| |  _| | |_) |  _| | |_) |
| . \| |___| |___|  __/| |___|  _ <
|_|\_\_____|_____|_|   |_____|_| \_\

  Reward-band maker order keeper
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("KEEPER_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        bot_name = %cfg.bot.name,
        symbol = %cfg.bot.symbol,
        quote = %cfg.bot.quote_currency,
        reward_threshold = %cfg.strategy.reward_threshold,
        order_offset = %cfg.strategy.order_offset,
        execution_risk_threshold = %cfg.strategy.execution_risk_threshold,
        order_notional = %cfg.strategy.order_notional,
        "KEEPER starting up"
    );

    // -- Gateways ----------------------------------------------------------

    let feed: Arc<dyn ExchangeGateway> = match cfg.market_data.provider.as_str() {
        "coinone" => Arc::new(CoinoneMarketData::new(
            cfg.market_data.base_url.as_deref(),
            Duration::from_secs(cfg.market_data.timeout_secs),
        )?),
        other => bail!("Unknown market data provider: {other}"),
    };
    if !feed.is_executable() {
        info!("Market data feed is read-only, orders go to the paper exchange");
    }
    let paper = Arc::new(PaperExchange::new(feed, cfg.paper()));
    let gateway: Arc<dyn ExchangeGateway> = paper.clone();

    // -- Preflight ---------------------------------------------------------

    let controller_cfg = cfg.controller();
    let reader = SnapshotReader::new(controller_cfg.symbol.clone(), cfg.tick_rule());
    let snapshot = reader
        .read(gateway.as_ref())
        .await
        .context("Preflight market read failed")?;
    info!(symbol = %reader.symbol(), %snapshot, "Preflight OK");

    // -- Main loop ---------------------------------------------------------

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received.");
        }
        signal_token.cancel();
    });

    let mut controller = CycleController::new(
        gateway,
        controller_cfg,
        cfg.repricing(),
        cfg.liquidation(),
        cfg.tick_rule(),
    );

    info!("Entering main loop. Press Ctrl+C to stop.");
    let result = controller.run(shutdown).await;

    info!(
        stats = %controller.stats(),
        paper_fills = paper.fill_count(),
        final_state = %controller.state(),
        "KEEPER shut down"
    );

    if let Err(e) = result {
        error!(error = %e, "Keeper stopped on fatal error");
        return Err(e.into());
    }
    Ok(())
}

/// Initialise the tracing subscriber.
///
/// Default filter is `keeper=info`, overridable with `RUST_LOG`.
/// Set `KEEPER_LOG_JSON=1` for JSON output.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("keeper=info"));

    let json_logging = std::env::var("KEEPER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
