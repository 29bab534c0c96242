use super::{CandleHistory, TickBuffer};
use crate::error::ScreenerError;
use crate::models::{ReferenceBook, Signal, Tick};
use crate::strategy::Strategy;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;

/// Folds ticks into partial candles and promotes closed buckets into history
///
/// Shared between the tick ingest task and the run loop; all interior state
/// is behind locks, so every method takes `&self`.
pub struct CandleAggregator {
    universe: Vec<String>,
    members: HashSet<String>,
    buffer: TickBuffer,
    history: CandleHistory,
    references: ReferenceBook,
    strategy: Arc<dyn Strategy>,
}

impl CandleAggregator {
    /// # Arguments
    /// * `universe` - Ordered instruments, promoted in this order
    /// * `bucket_width` - Candle width
    /// * `history_cap` - Candles kept per instrument
    /// * `references` - Prior-session levels; missing instruments never signal
    /// * `strategy` - Evaluator; its window size is the evaluation stride
    pub fn new(
        universe: Vec<String>,
        bucket_width: Duration,
        history_cap: usize,
        references: ReferenceBook,
        strategy: Arc<dyn Strategy>,
    ) -> Self {
        let members = universe.iter().cloned().collect();
        Self {
            universe,
            members,
            buffer: TickBuffer::new(bucket_width),
            history: CandleHistory::new(history_cap),
            references,
            strategy,
        }
    }

    pub fn universe(&self) -> &[String] {
        &self.universe
    }

    pub fn buffer(&self) -> &TickBuffer {
        &self.buffer
    }

    pub fn history(&self) -> &CandleHistory {
        &self.history
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn stride(&self) -> usize {
        self.strategy.min_candles_required()
    }

    /// Merge a tick into the buffer
    ///
    /// Returns `Ok(false)` for instruments outside the universe, which are
    /// ignored.
    pub fn ingest(&self, tick: &Tick) -> Result<bool, ScreenerError> {
        if !self.members.contains(&tick.instrument) {
            tracing::debug!(instrument = %tick.instrument, "Ignoring tick outside universe");
            return Ok(false);
        }

        self.buffer.ingest(tick)?;
        Ok(true)
    }

    /// Promote `now_bucket` for every instrument and evaluate where due
    ///
    /// Failures are isolated per instrument: they are logged and the
    /// remaining instruments are still processed.
    pub fn promote(&self, now_bucket: DateTime<Utc>, emitted_at: DateTime<Utc>) -> Vec<Signal> {
        let mut signals = Vec::new();

        for instrument in &self.universe {
            match self.promote_instrument(instrument, now_bucket, emitted_at) {
                Ok(Some(signal)) => signals.push(signal),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("  ✗ {} promotion failed: {}", instrument, e);
                }
            }
        }

        signals
    }

    fn promote_instrument(
        &self,
        instrument: &str,
        now_bucket: DateTime<Utc>,
        emitted_at: DateTime<Utc>,
    ) -> Result<Option<Signal>, ScreenerError> {
        let taken = self.buffer.take(instrument, now_bucket)?;

        if taken.stale_dropped > 0 {
            tracing::debug!(
                "{}: dropped {} stale partial candle(s) before {}",
                instrument,
                taken.stale_dropped,
                now_bucket.format("%H:%M")
            );
        }

        let Some(partial) = taken.partial else {
            return Ok(None);
        };

        let len = self.history.push(partial.finalize(instrument))?;
        let stride = self.stride();

        if len < stride || len % stride != 0 {
            return Ok(None);
        }

        let window = self.history.recent(instrument, stride)?;
        Ok(self.strategy.evaluate(
            instrument,
            &window,
            self.references.get(instrument),
            emitted_at,
        ))
    }

    /// Drop every buffered partial candle without promoting it
    pub fn discard_pending(&self) -> Result<usize, ScreenerError> {
        self.buffer.clear()
    }
}
