use super::{MarketGate, RunLoop, RunSummary, SignalPresenter};
use crate::aggregation::CandleAggregator;
use crate::config::ScreenerConfig;
use crate::feed::{run_ingest, spawn_frame_reader, tick_channel, SyntheticFeed};
use std::io::BufRead;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Where live ticks come from
pub enum TickSource {
    Synthetic(SyntheticFeed),
    /// Line-delimited wire frames, e.g. stdin
    Frames(Box<dyn BufRead + Send>),
}

#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub cadence: Duration,
    pub grace: Duration,
    pub recent_signals: usize,
    pub channel_capacity: usize,
}

impl LiveSettings {
    pub fn from_config(config: &ScreenerConfig) -> Self {
        Self {
            cadence: config.cadence(),
            grace: Duration::from_secs(config.promotion_grace_secs),
            recent_signals: config.recent_signals,
            channel_capacity: config.channel_capacity,
        }
    }
}

/// Wire a tick source through the ingest task into the run loop
///
/// Returns once the run loop stops (gate closed or `cancel` fired) and the
/// tokio-side tasks have wound down. A frame reader blocked on input is left
/// behind on its own thread.
pub async fn run_live<G, P>(
    aggregator: Arc<CandleAggregator>,
    gate: G,
    source: TickSource,
    settings: &LiveSettings,
    cancel: CancellationToken,
    presenter: &P,
) -> RunSummary
where
    G: MarketGate,
    P: SignalPresenter + ?Sized,
{
    let (tx, rx) = tick_channel(settings.channel_capacity);
    let ingest_task = tokio::spawn(run_ingest(rx, aggregator.clone(), cancel.clone()));

    let feed_task = match source {
        TickSource::Synthetic(feed) => Some(tokio::spawn(feed.run(tx, cancel.clone()))),
        TickSource::Frames(reader) => {
            if let Err(e) = spawn_frame_reader(reader, tx, cancel.clone()) {
                tracing::error!("Failed to start frame reader: {}", e);
            }
            None
        }
    };

    let mut run_loop = RunLoop::new(aggregator, gate, cancel.clone())
        .with_cadence(settings.cadence)
        .with_grace(settings.grace)
        .with_recent_signals(settings.recent_signals);
    let summary = run_loop.run(presenter).await;

    cancel.cancel();

    if let Some(task) = feed_task {
        if let Err(e) = task.await {
            tracing::error!("Synthetic feed task failed: {}", e);
        }
    }
    if let Err(e) = ingest_task.await {
        tracing::error!("Ingest task failed: {}", e);
    }

    summary
}
