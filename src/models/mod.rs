use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single price update for one instrument, as delivered by the feed
///
/// OHLC values describe the feed's own internal window; `volume` is the
/// traded volume inside that window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Mutable accumulator for one (instrument, bucket) pair
#[derive(Debug, Clone, PartialEq)]
pub struct PartialCandle {
    pub bucket: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PartialCandle {
    /// Seed a partial candle directly from the first tick of its bucket
    pub fn seed(bucket: DateTime<Utc>, tick: &Tick) -> Self {
        Self {
            bucket,
            open: tick.open,
            high: tick.high,
            low: tick.low,
            close: tick.close,
            volume: tick.volume,
        }
    }

    /// Fold a later tick of the same bucket into this candle
    ///
    /// `open` is never overwritten; `close` is last-write-wins.
    pub fn merge(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.high);
        self.low = self.low.min(tick.low);
        self.close = tick.close;
        self.volume += tick.volume;
    }

    pub fn finalize(self, instrument: &str) -> Candle {
        Candle {
            instrument: instrument.to_string(),
            timestamp: self.bucket,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// Finalized OHLCV candle; `timestamp` is the bucket start
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Prior-session high/low used as the gap baseline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ReferenceLevels {
    pub high: f64,
    pub low: f64,
}

/// Reference levels per instrument; a missing entry means the fetch failed
pub type ReferenceBook = HashMap<String, ReferenceLevels>;

/// Gap/trend/VWAP confluence classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    GapUpBullish,
    GapDownBearish,
}

impl SignalKind {
    pub fn describe(&self, instrument: &str) -> String {
        match self {
            SignalKind::GapUpBullish => {
                format!("📈 {}: GAP UP + Bullish + Above VWAP", instrument)
            }
            SignalKind::GapDownBearish => {
                format!("📉 {}: GAP DOWN + Bearish + Below VWAP", instrument)
            }
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::GapUpBullish => write!(f, "GAP_UP_BULLISH"),
            SignalKind::GapDownBearish => write!(f, "GAP_DOWN_BEARISH"),
        }
    }
}

/// Emitted trading signal
///
/// `emitted_at` is wall-clock emission time, not a candle timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub instrument: String,
    pub emitted_at: DateTime<Utc>,
    pub kind: SignalKind,
    pub message: String,
    pub open: f64,
    pub close: f64,
    pub vwap: f64,
}
