// Tick bucketing and candle promotion
pub mod aggregator;
pub mod candle_history;
pub mod tick_buffer;

pub use aggregator::CandleAggregator;
pub use candle_history::CandleHistory;
pub use tick_buffer::{bucket_start, TickBuffer};
