use crate::error::ScreenerError;
use crate::models::{ReferenceBook, ReferenceLevels};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "gapscreener";

/// Nifty 50 constituents, equity series
pub const DEFAULT_UNIVERSE: &[&str] = &[
    "ADANIENT-EQ", "ADANIPORTS-EQ", "APOLLOHOSP-EQ", "ASIANPAINT-EQ", "AXISBANK-EQ",
    "BAJAJ-AUTO-EQ", "BAJAJFINSV-EQ", "BAJFINANCE-EQ", "BEL-EQ", "BHARTIARTL-EQ",
    "CIPLA-EQ", "COALINDIA-EQ", "DRREDDY-EQ", "EICHERMOT-EQ", "ETERNAL-EQ",
    "GRASIM-EQ", "HCLTECH-EQ", "HDFCBANK-EQ", "HDFCLIFE-EQ", "HEROMOTOCO-EQ",
    "HINDALCO-EQ", "HINDUNILVR-EQ", "ICICIBANK-EQ", "INDUSINDBK-EQ", "INFY-EQ",
    "ITC-EQ", "JIOFIN-EQ", "JSWSTEEL-EQ", "KOTAKBANK-EQ", "LT-EQ",
    "M&M-EQ", "MARUTI-EQ", "NESTLEIND-EQ", "NTPC-EQ", "ONGC-EQ",
    "POWERGRID-EQ", "RELIANCE-EQ", "SBILIFE-EQ", "SBIN-EQ", "SHRIRAMFIN-EQ",
    "SUNPHARMA-EQ", "TATACONSUM-EQ", "TATAMOTORS-EQ", "TATASTEEL-EQ", "TCS-EQ",
    "TECHM-EQ", "TITAN-EQ", "TRENT-EQ", "ULTRACEMCO-EQ", "WIPRO-EQ",
];

/// Trading session window, wall-clock times at a fixed UTC offset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    pub open: String,  // "HH:MM"
    pub close: String, // "HH:MM", inclusive
    pub utc_offset_minutes: i32,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            open: "09:15".to_string(),
            close: "15:30".to_string(),
            utc_offset_minutes: 330, // IST
        }
    }
}

/// Historical-data API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub base_url: String,
    pub requests_per_second: u32,
    pub timeout_secs: u64,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            base_url: "https://api-t1.fyers.in".to_string(),
            requests_per_second: 10,
            timeout_secs: 10,
        }
    }
}

/// Static prior-session levels for one instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub instrument: String,
    pub high: f64,
    pub low: f64,
}

/// Screener configuration
///
/// Layered: defaults, then the optional config file, then `SCREENER__*`
/// environment variables (e.g. `SCREENER__STRIDE=5`, `SCREENER__MARKET__OPEN=09:15`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenerConfig {
    pub universe: Vec<String>,
    pub exchange: String,
    pub bucket_secs: u64,
    pub history_cap: usize,
    pub stride: usize,
    pub cadence_secs: u64,
    /// Delay after a bucket boundary before promoting it
    pub promotion_grace_secs: u64,
    pub channel_capacity: usize,
    /// How many signals the presenter shows each cycle
    pub recent_signals: usize,
    pub market: MarketSettings,
    pub history: HistorySettings,
    /// Fallback prior-session levels, used when no history credentials are set
    pub reference_levels: Vec<ReferenceEntry>,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            universe: DEFAULT_UNIVERSE.iter().map(|s| s.to_string()).collect(),
            exchange: "NSE".to_string(),
            bucket_secs: 60,
            history_cap: 30,
            stride: 5,
            cadence_secs: 60,
            promotion_grace_secs: 2,
            channel_capacity: 4096,
            recent_signals: 10,
            market: MarketSettings::default(),
            history: HistorySettings::default(),
            reference_levels: Vec::new(),
        }
    }
}

impl ScreenerConfig {
    /// Load configuration from an explicit file, or from the default file if present
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => ::config::File::from(path).required(true),
            None => ::config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: ScreenerConfig = ::config::Config::builder()
            .add_source(file)
            .add_source(
                ::config::Environment::with_prefix("SCREENER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScreenerError> {
        let invalid = |msg: &str| Err(ScreenerError::InvalidConfig(msg.to_string()));

        if self.universe.is_empty() {
            return invalid("universe must not be empty");
        }
        if self.bucket_secs == 0 {
            return invalid("bucket_secs must be positive");
        }
        if self.cadence_secs == 0 {
            return invalid("cadence_secs must be positive");
        }
        if self.stride == 0 || self.history_cap == 0 {
            return invalid("stride and history_cap must be positive");
        }
        if self.stride > self.history_cap {
            return invalid("stride must not exceed history_cap");
        }
        // Each cycle promotes exactly one bucket; a slower cadence skips buckets
        // and a faster one re-promotes an already emptied bucket
        if self.cadence_secs != self.bucket_secs {
            return invalid("cadence_secs must equal bucket_secs");
        }

        // Parses both times and checks ordering
        crate::session::MarketHours::from_settings(&self.market)?;

        Ok(())
    }

    pub fn static_references(&self) -> ReferenceBook {
        self.reference_levels
            .iter()
            .map(|entry| {
                (
                    entry.instrument.clone(),
                    ReferenceLevels {
                        high: entry.high,
                        low: entry.low,
                    },
                )
            })
            .collect()
    }

    pub fn bucket_width(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.bucket_secs as i64)
    }

    pub fn cadence(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cadence_secs)
    }
}
