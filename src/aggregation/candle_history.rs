use crate::error::ScreenerError;
use crate::models::Candle;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

/// Promoted candles per instrument, capped at `max_candles`
///
/// Sequences are oldest first. Appending past the cap evicts from the front.
/// Instruments with no promoted candle have no entry and read as empty.
#[derive(Clone)]
pub struct CandleHistory {
    series: Arc<RwLock<HashMap<String, VecDeque<Candle>>>>,
    max_candles: usize,
}

impl CandleHistory {
    /// `max_candles` applies to each instrument separately
    pub fn new(max_candles: usize) -> Self {
        Self {
            series: Arc::new(RwLock::new(HashMap::new())),
            max_candles,
        }
    }

    pub fn max_candles(&self) -> usize {
        self.max_candles
    }

    /// Returns the instrument's length after eviction; the aggregator gates
    /// evaluation on it
    pub fn push(&self, candle: Candle) -> Result<usize, ScreenerError> {
        let mut series = self.series.write().map_err(ScreenerError::poisoned)?;
        let capacity = self.max_candles;

        let window = series
            .entry(candle.instrument.clone())
            .or_insert_with(|| VecDeque::with_capacity(capacity));

        if window.len() >= capacity {
            let excess = window.len() + 1 - capacity;
            window.drain(..excess.min(window.len()));
        }
        window.push_back(candle);

        Ok(window.len())
    }

    pub fn candles(&self, instrument: &str) -> Result<Vec<Candle>, ScreenerError> {
        self.recent(instrument, usize::MAX)
    }

    /// Up to `n` newest candles, still oldest first
    pub fn recent(&self, instrument: &str, n: usize) -> Result<Vec<Candle>, ScreenerError> {
        let series = self.series.read().map_err(ScreenerError::poisoned)?;

        let Some(window) = series.get(instrument) else {
            return Ok(Vec::new());
        };
        let from = window.len().saturating_sub(n);
        Ok(window.range(from..).cloned().collect())
    }

    pub fn len(&self, instrument: &str) -> Result<usize, ScreenerError> {
        let series = self.series.read().map_err(ScreenerError::poisoned)?;
        Ok(series.get(instrument).map_or(0, VecDeque::len))
    }
}
