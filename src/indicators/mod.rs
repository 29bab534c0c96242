// Technical indicators module
// Volume-weighted average price over candle windows

pub mod vwap;

pub use vwap::{calculate_vwap, calculate_vwap_series};
