use crate::config::MarketSettings;
use crate::error::ScreenerError;
use chrono::{DateTime, FixedOffset, NaiveTime, Utc};

/// On/off gate consulted before the run loop starts and at the top of every cycle
pub trait MarketGate: Send + Sync {
    fn is_open(&self, now: DateTime<Utc>) -> bool;
}

/// Fixed daily session window, both ends inclusive
///
/// No weekday or holiday calendar: only the wall-clock time is checked.
#[derive(Debug, Clone)]
pub struct MarketHours {
    open: NaiveTime,
    close: NaiveTime,
    offset: FixedOffset,
}

impl MarketHours {
    pub fn new(open: NaiveTime, close: NaiveTime, offset: FixedOffset) -> Self {
        Self {
            open,
            close,
            offset,
        }
    }

    pub fn from_settings(settings: &MarketSettings) -> Result<Self, ScreenerError> {
        let parse = |value: &str| {
            NaiveTime::parse_from_str(value, "%H:%M").map_err(|e| {
                ScreenerError::InvalidConfig(format!("bad market time '{}': {}", value, e))
            })
        };

        let open = parse(&settings.open)?;
        let close = parse(&settings.close)?;
        if open >= close {
            return Err(ScreenerError::InvalidConfig(format!(
                "market open {} must be before close {}",
                open, close
            )));
        }

        let offset = FixedOffset::east_opt(settings.utc_offset_minutes * 60).ok_or_else(|| {
            ScreenerError::InvalidConfig(format!(
                "utc_offset_minutes out of range: {}",
                settings.utc_offset_minutes
            ))
        })?;

        Ok(Self::new(open, close, offset))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl MarketGate for MarketHours {
    fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset).time();
        local >= self.open && local <= self.close
    }
}

/// Gate that never closes, for replays and simulations outside market hours
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOpen;

impl MarketGate for AlwaysOpen {
    fn is_open(&self, _now: DateTime<Utc>) -> bool {
        true
    }
}
