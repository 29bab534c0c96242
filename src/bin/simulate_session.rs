use chrono::{Duration, TimeZone, Utc};
use clap::Parser;
use gapscreener::feed::SyntheticTickGenerator;
use gapscreener::session::{AlwaysOpen, LogPresenter, RunLoop, SignalPresenter};
use gapscreener::strategy::GapVwapStrategy;
use gapscreener::{CandleAggregator, Result, ScreenerConfig, Signal};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "simulate_session", about = "Run one synthetic session on a simulated clock")]
struct Args {
    /// Session length in minutes
    #[arg(long, default_value_t = 60)]
    minutes: i64,

    /// Random seed for the tick generator
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Seconds between synthetic ticks per instrument
    #[arg(long, default_value_t = 5)]
    tick_secs: i64,
}

/// Only reports cycles that grew the feed
struct ChangePresenter {
    inner: LogPresenter,
    last_seen: std::sync::Mutex<Option<String>>,
}

impl SignalPresenter for ChangePresenter {
    fn present(&self, recent: &[Signal]) {
        let newest = recent.last().map(|s| format!("{}@{}", s.instrument, s.emitted_at));
        let Ok(mut last_seen) = self.last_seen.lock() else {
            return;
        };
        if *last_seen != newest {
            *last_seen = newest;
            self.inner.present(recent);
        }
    }

    fn stopped(&self) {
        self.inner.stopped();
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("gapscreener=info")
        .init();

    let args = Args::parse();
    let config = ScreenerConfig::default();
    let width = config.bucket_width();

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║          GAP SCREENER SESSION SIMULATION              ║");
    println!("╚═══════════════════════════════════════════════════════╝");

    let mut generator = SyntheticTickGenerator::new(&config.universe, args.seed);
    let aggregator = Arc::new(CandleAggregator::new(
        config.universe.clone(),
        width,
        config.history_cap,
        generator.reference_levels(),
        Arc::new(GapVwapStrategy::new(config.stride)),
    ));

    let offset = chrono::FixedOffset::east_opt(config.market.utc_offset_minutes * 60)
        .ok_or("invalid utc offset")?;
    // 09:15 IST on a fixed trading day
    let session_open = Utc
        .with_ymd_and_hms(2025, 1, 6, 3, 45, 0)
        .single()
        .ok_or("invalid session start")?;

    let presenter = ChangePresenter {
        inner: LogPresenter::new(offset),
        last_seen: std::sync::Mutex::new(None),
    };
    let mut run_loop = RunLoop::new(aggregator.clone(), AlwaysOpen, CancellationToken::new())
        .with_recent_signals(config.recent_signals);

    let tick_step = Duration::seconds(args.tick_secs.max(1));
    let grace = Duration::seconds(config.promotion_grace_secs as i64);

    for minute in 0..args.minutes {
        let bucket = session_open + width * minute as i32;

        let mut ts = bucket;
        while ts < bucket + width {
            for tick in generator.next_ticks(ts) {
                aggregator.ingest(&tick)?;
            }
            ts += tick_step;
        }

        run_loop.run_cycle(bucket + width + grace, &presenter);
    }

    let signals = run_loop.feed().all()?;
    println!("\n📋 Session summary ({} minutes, seed {})", args.minutes, args.seed);
    println!("  Cycles:  {}", run_loop.summary().cycles);
    println!("  Signals: {}", signals.len());

    for signal in &signals {
        println!(
            "  {}  {:<16} {:<18} open {:>9.2}  close {:>9.2}  vwap {:>9.2}",
            signal.emitted_at.with_timezone(&offset).format("%H:%M:%S"),
            signal.instrument,
            signal.kind.to_string(),
            signal.open,
            signal.close,
            signal.vwap
        );
    }

    Ok(())
}
