use crate::aggregation::CandleAggregator;
use crate::models::Tick;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Create the bounded channel between feed sources and the ingest task
pub fn tick_channel(capacity: usize) -> (mpsc::Sender<Tick>, mpsc::Receiver<Tick>) {
    mpsc::channel(capacity.max(1))
}

/// Counters reported when the ingest task exits
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: u64,
    pub ignored: u64,
    pub failed: u64,
}

/// Single consumer folding every received tick into the aggregator
///
/// Exits when the token is cancelled or every sender has been dropped.
pub async fn run_ingest(
    mut rx: mpsc::Receiver<Tick>,
    aggregator: Arc<CandleAggregator>,
    cancel: CancellationToken,
) -> IngestStats {
    let mut stats = IngestStats::default();

    loop {
        let tick = tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Some(tick) => tick,
                None => break,
            },
        };

        match aggregator.ingest(&tick) {
            Ok(true) => stats.accepted += 1,
            Ok(false) => stats.ignored += 1,
            Err(e) => {
                stats.failed += 1;
                tracing::warn!("Failed to ingest tick for {}: {}", tick.instrument, e);
            }
        }
    }

    tracing::info!(
        "📥 Ingest stopped: {} accepted, {} ignored, {} failed",
        stats.accepted,
        stats.ignored,
        stats.failed
    );

    stats
}
