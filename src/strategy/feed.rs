use crate::error::ScreenerError;
use crate::models::Signal;
use std::sync::{Arc, RwLock};

/// Append-only feed of emitted signals, shared with the presentation side
#[derive(Clone, Default)]
pub struct SignalFeed {
    signals: Arc<RwLock<Vec<Signal>>>,
}

impl SignalFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, signal: Signal) -> Result<(), ScreenerError> {
        let mut signals = self.signals.write().map_err(ScreenerError::poisoned)?;
        tracing::info!("🔔 {}", signal.message);
        signals.push(signal);
        Ok(())
    }

    /// The `k` most recent signals, oldest first
    pub fn recent(&self, k: usize) -> Result<Vec<Signal>, ScreenerError> {
        let signals = self.signals.read().map_err(ScreenerError::poisoned)?;
        let start = signals.len().saturating_sub(k);
        Ok(signals[start..].to_vec())
    }

    pub fn all(&self) -> Result<Vec<Signal>, ScreenerError> {
        let signals = self.signals.read().map_err(ScreenerError::poisoned)?;
        Ok(signals.clone())
    }

    pub fn len(&self) -> Result<usize, ScreenerError> {
        let signals = self.signals.read().map_err(ScreenerError::poisoned)?;
        Ok(signals.len())
    }

    pub fn is_empty(&self) -> Result<bool, ScreenerError> {
        Ok(self.len()? == 0)
    }
}
