use crate::error::ScreenerError;
use crate::models::Tick;
use chrono::DateTime;
use serde::Deserialize;

/// One frame pushed by the market-data socket
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedFrame {
    symbol_data: Vec<SymbolUpdate>,
}

/// Per-symbol update inside a frame
#[derive(Debug, Deserialize)]
struct SymbolUpdate {
    symbol: String,    // "NSE:SBIN-EQ"
    timestamp: i64,    // epoch seconds
    open_price: f64,
    high_price: f64,
    low_price: f64,
    close_price: f64,
    min_volume: f64,
}

impl SymbolUpdate {
    fn into_tick(self) -> Result<Tick, ScreenerError> {
        let timestamp = DateTime::from_timestamp(self.timestamp, 0).ok_or_else(|| {
            ScreenerError::MalformedMessage(format!("timestamp out of range: {}", self.timestamp))
        })?;

        Ok(Tick {
            instrument: strip_exchange(&self.symbol).to_string(),
            timestamp,
            open: self.open_price,
            high: self.high_price,
            low: self.low_price,
            close: self.close_price,
            volume: self.min_volume,
        })
    }
}

/// Drop the exchange prefix: `"NSE:SBIN-EQ"` -> `"SBIN-EQ"`
pub fn strip_exchange(symbol: &str) -> &str {
    symbol.rsplit(':').next().unwrap_or(symbol)
}

/// Decode one JSON frame into ticks, one per symbol entry
pub fn decode_frame(raw: &str) -> Result<Vec<Tick>, ScreenerError> {
    let frame: FeedFrame = serde_json::from_str(raw)
        .map_err(|e| ScreenerError::MalformedMessage(e.to_string()))?;

    frame
        .symbol_data
        .into_iter()
        .map(SymbolUpdate::into_tick)
        .collect()
}
