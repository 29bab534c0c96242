use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use gapscreener::api::{load_reference_levels, HistoryClient, StaticReferenceSource};
use gapscreener::feed::{
    run_ingest, tick_channel, ReplayFeed, SyntheticFeed, SyntheticTickGenerator,
};
use gapscreener::session::{
    run_live, AlwaysOpen, LiveSettings, LogPresenter, MarketHours, RunLoop, TickSource,
};
use gapscreener::strategy::GapVwapStrategy;
use gapscreener::{CandleAggregator, ReferenceBook, ScreenerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "gapscreener", about = "Intraday gap + VWAP screener")]
struct Args {
    /// Config file (TOML); defaults to ./gapscreener.toml when present
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay recorded feed frames (one JSON frame per line) on a simulated clock
    #[arg(long, conflicts_with = "synthetic")]
    ticks: Option<PathBuf>,

    /// Generate random-walk ticks instead of reading frames from stdin
    #[arg(long)]
    synthetic: bool,

    /// Keep running outside the configured market session
    #[arg(long)]
    ignore_market_hours: bool,

    /// Seed for the synthetic feed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let config = ScreenerConfig::load(args.config.as_deref())?;

    tracing::info!("🚀 Gap screener starting");
    tracing::info!(
        "📊 {} instruments, {}s candles, cap {}, evaluate every {} candles",
        config.universe.len(),
        config.bucket_secs,
        config.history_cap,
        config.stride
    );

    let hours = MarketHours::from_settings(&config.market)?;
    let presenter = LogPresenter::new(hours.offset());

    if let Some(path) = args.ticks.clone() {
        return replay_session(&config, path, &presenter).await;
    }

    let session = Utc::now().with_timezone(&hours.offset()).date_naive();
    let generator = args
        .synthetic
        .then(|| SyntheticTickGenerator::new(&config.universe, args.seed));

    let references = match &generator {
        Some(generator) => generator.reference_levels(),
        None => load_references(&config, session).await?,
    };

    let aggregator = create_aggregator(&config, references);
    tracing::info!(
        "🧠 Strategy: {} over {} instruments",
        aggregator.strategy_name(),
        aggregator.universe().len()
    );

    let source = match generator {
        Some(generator) => {
            tracing::info!("🎲 Synthetic feed (seed {})", args.seed);
            TickSource::Synthetic(SyntheticFeed::new(generator, Duration::from_secs(1)))
        }
        None => {
            tracing::info!("📡 Reading feed frames from stdin");
            TickSource::Frames(Box::new(std::io::BufReader::new(std::io::stdin())))
        }
    };

    let cancel = CancellationToken::new();
    let shutdown = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("⚠️  Received Ctrl+C, shutting down...");
            }
            cancel.cancel();
        })
    };

    let settings = LiveSettings::from_config(&config);
    let summary = if args.ignore_market_hours {
        run_live(aggregator, AlwaysOpen, source, &settings, cancel, &presenter).await
    } else {
        run_live(aggregator, hours, source, &settings, cancel, &presenter).await
    };
    shutdown.abort();

    tracing::info!(
        "👋 Gap screener stopped: {} cycles, {} signals",
        summary.cycles,
        summary.signals
    );
    Ok(())
}

/// Replay a recorded file, then promote every bucket it covers in order
async fn replay_session(
    config: &ScreenerConfig,
    path: PathBuf,
    presenter: &LogPresenter,
) -> anyhow::Result<()> {
    let aggregator = create_aggregator(config, config.static_references());
    let cancel = CancellationToken::new();
    let (tx, rx) = tick_channel(config.channel_capacity);

    let ingest_task = tokio::spawn(run_ingest(rx, aggregator.clone(), cancel.clone()));
    let stats = ReplayFeed::new(&path)
        .run(tx, cancel.clone())
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("Failed to replay {}", path.display()))?;

    // Sender dropped: ingest drains the channel and exits
    let ingest = ingest_task.await.context("Ingest task failed")?;
    tracing::info!("📥 Ingested {} of {} replayed ticks", ingest.accepted, stats.ticks);

    let (Some(first), Some(last)) = (stats.first_tick, stats.last_tick) else {
        tracing::warn!("No ticks in {}", path.display());
        return Ok(());
    };

    let mut run_loop = RunLoop::new(aggregator, AlwaysOpen, cancel)
        .with_grace(Duration::from_secs(config.promotion_grace_secs))
        .with_recent_signals(config.recent_signals);
    let summary = run_loop.run_simulated(first, last, presenter);

    tracing::info!(
        "✅ Replay complete: {} cycles, {} signals",
        summary.cycles,
        summary.signals
    );
    Ok(())
}

fn create_aggregator(config: &ScreenerConfig, references: ReferenceBook) -> Arc<CandleAggregator> {
    Arc::new(CandleAggregator::new(
        config.universe.clone(),
        config.bucket_width(),
        config.history_cap,
        references,
        Arc::new(GapVwapStrategy::new(config.stride)),
    ))
}

/// Prior-session levels from the history API when credentials are set, else from config
async fn load_references(
    config: &ScreenerConfig,
    session: NaiveDate,
) -> anyhow::Result<ReferenceBook> {
    let credentials = (
        std::env::var("HISTORY_CLIENT_ID").ok(),
        std::env::var("HISTORY_ACCESS_TOKEN").ok(),
    );

    let book = match credentials {
        (Some(client_id), Some(access_token)) => {
            tracing::info!("📚 Fetching prior-session levels for {}", session);
            let client =
                HistoryClient::new(&config.history, &config.exchange, &client_id, &access_token)
                    .map_err(|e| anyhow::anyhow!("Failed to build history client: {}", e))?;
            load_reference_levels(&client, &config.universe, session).await
        }
        _ => {
            tracing::info!("📚 No history credentials, using configured reference levels");
            let source = StaticReferenceSource::new(config.static_references());
            load_reference_levels(&source, &config.universe, session).await
        }
    };

    Ok(book)
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gapscreener=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
