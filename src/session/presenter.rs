use crate::models::Signal;
use chrono::FixedOffset;

/// Receives the most recent slice of the signal feed once per cycle
pub trait SignalPresenter: Send + Sync {
    fn present(&self, recent: &[Signal]);

    /// Called once when the run loop stops
    fn stopped(&self) {}
}

/// Renders the signal feed through the log
pub struct LogPresenter {
    offset: FixedOffset,
}

impl LogPresenter {
    /// Emission times are shown in the given offset (the exchange's local time)
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl SignalPresenter for LogPresenter {
    fn present(&self, recent: &[Signal]) {
        if recent.is_empty() {
            tracing::info!("No signals yet... waiting for market activity.");
            return;
        }

        tracing::info!("📌 Latest Signals ({})", recent.len());
        for signal in recent {
            tracing::info!(
                "  {}  {}  (open {:.2}, close {:.2}, vwap {:.2})",
                signal.emitted_at.with_timezone(&self.offset).format("%H:%M:%S"),
                signal.message,
                signal.open,
                signal.close,
                signal.vwap
            );
        }
    }

    fn stopped(&self) {
        tracing::info!("✅ Market Closed. Screener Stopped.");
    }
}
