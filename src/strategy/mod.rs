// Signal strategy module
pub mod feed;
pub mod gap_vwap;

pub use feed::SignalFeed;
pub use gap_vwap::{classify, GapVwapStrategy};

use crate::models::{Candle, ReferenceLevels, Signal};
use chrono::{DateTime, Utc};

/// Base trait for signal strategies evaluated over a candle window
pub trait Strategy: Send + Sync {
    /// Evaluate a window (oldest first) against the instrument's reference levels
    ///
    /// Must never fail: missing or degenerate inputs yield `None`.
    fn evaluate(
        &self,
        instrument: &str,
        window: &[Candle],
        reference: Option<&ReferenceLevels>,
        emitted_at: DateTime<Utc>,
    ) -> Option<Signal>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Number of candles per evaluation window; also the evaluation stride
    fn min_candles_required(&self) -> usize;
}
