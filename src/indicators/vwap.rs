use crate::models::Candle;

/// Calculate the cumulative Volume-Weighted Average Price series
///
/// Each entry uses only the candles up to and including its index:
/// `Σ(typical × volume) / Σ(volume)` with typical = (high + low + close) / 3.
///
/// An entry is `None` while the cumulative volume of its prefix is zero.
pub fn calculate_vwap_series(candles: &[Candle]) -> Vec<Option<f64>> {
    let mut cumulative_pv = 0.0;
    let mut cumulative_volume = 0.0;

    candles
        .iter()
        .map(|candle| {
            cumulative_pv += candle.typical_price() * candle.volume;
            cumulative_volume += candle.volume;

            if cumulative_volume > 0.0 {
                Some(cumulative_pv / cumulative_volume)
            } else {
                None
            }
        })
        .collect()
}

/// VWAP over the whole window (last value of the cumulative series)
pub fn calculate_vwap(candles: &[Candle]) -> Option<f64> {
    calculate_vwap_series(candles).last().copied().flatten()
}
