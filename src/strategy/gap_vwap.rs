use super::Strategy;
use crate::indicators::calculate_vwap;
use crate::models::{Candle, ReferenceLevels, Signal, SignalKind};
use chrono::{DateTime, Utc};

/// Classify a gap/trend/VWAP confluence
///
/// First match wins:
/// - gap up: `open > ref.high`, `close > open`, `close > vwap`
/// - gap down: `open < ref.low`, `close < open`, `close < vwap`
pub fn classify(open: f64, close: f64, vwap: f64, reference: &ReferenceLevels) -> Option<SignalKind> {
    if open > reference.high && close > open && close > vwap {
        Some(SignalKind::GapUpBullish)
    } else if open < reference.low && close < open && close < vwap {
        Some(SignalKind::GapDownBearish)
    } else {
        None
    }
}

/// Gap-vs-previous-session strategy confirmed by intraday trend and VWAP
///
/// `open` is the open of the oldest candle in the evaluated window, not the
/// session open. `close` is the newest candle's close and VWAP is computed
/// over the window only.
#[derive(Debug, Clone)]
pub struct GapVwapStrategy {
    window: usize,
}

impl GapVwapStrategy {
    /// `window` is also the aggregator's evaluation stride
    ///
    /// A window of 0 is raised to 1. `ScreenerConfig::validate` rejects a
    /// zero stride, but the aggregator divides by this value, so direct
    /// library callers get a one-candle window instead of a panic.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }
}

impl Default for GapVwapStrategy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Strategy for GapVwapStrategy {
    fn evaluate(
        &self,
        instrument: &str,
        window: &[Candle],
        reference: Option<&ReferenceLevels>,
        emitted_at: DateTime<Utc>,
    ) -> Option<Signal> {
        let Some(reference) = reference else {
            tracing::debug!(instrument, "No reference levels, skipping evaluation");
            return None;
        };

        let open = window.first()?.open;
        let close = window.last()?.close;
        let Some(vwap) = calculate_vwap(window) else {
            tracing::debug!(instrument, "Zero volume window, VWAP undefined");
            return None;
        };

        tracing::debug!(
            "{}: open={:.2} close={:.2} vwap={:.2} ref_high={:.2} ref_low={:.2}",
            instrument,
            open,
            close,
            vwap,
            reference.high,
            reference.low
        );

        let kind = classify(open, close, vwap, reference)?;

        Some(Signal {
            instrument: instrument.to_string(),
            emitted_at,
            kind,
            message: kind.describe(instrument),
            open,
            close,
            vwap,
        })
    }

    fn name(&self) -> &str {
        "Gap + VWAP"
    }

    fn min_candles_required(&self) -> usize {
        self.window
    }
}
