// Core modules
pub mod aggregation;
pub mod api;
pub mod config;
pub mod error;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod session;
pub mod strategy;

// Re-export commonly used types
pub use aggregation::CandleAggregator;
pub use config::ScreenerConfig;
pub use error::ScreenerError;
pub use models::*;
pub use strategy::{SignalFeed, Strategy};

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
