use crate::error::ScreenerError;
use crate::models::{PartialCandle, Tick};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Truncate a timestamp to the start of its bucket
///
/// With a 60s width this zeroes seconds and sub-seconds.
pub fn bucket_start(ts: DateTime<Utc>, width: Duration) -> DateTime<Utc> {
    let width_secs = width.num_seconds().max(1);
    let rem = ts.timestamp().rem_euclid(width_secs);
    ts - Duration::seconds(rem) - Duration::nanoseconds(ts.timestamp_subsec_nanos() as i64)
}

/// Result of removing one bucket from the buffer
#[derive(Debug, Default)]
pub struct Taken {
    pub partial: Option<PartialCandle>,
    /// Partial candles older than the requested bucket, discarded
    pub stale_dropped: usize,
}

/// Thread-safe buffer of partial candles keyed by instrument and bucket start
///
/// The buffer never finalizes anything on its own; buckets leave it only
/// through [`TickBuffer::take`].
#[derive(Clone)]
pub struct TickBuffer {
    data: Arc<Mutex<HashMap<String, BTreeMap<DateTime<Utc>, PartialCandle>>>>,
    bucket_width: Duration,
}

impl TickBuffer {
    pub fn new(bucket_width: Duration) -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            bucket_width,
        }
    }

    pub fn bucket_width(&self) -> Duration {
        self.bucket_width
    }

    /// Merge a tick into the partial candle of its bucket
    ///
    /// Duplicates are not detected: the same tick ingested twice counts
    /// its volume twice.
    pub fn ingest(&self, tick: &Tick) -> Result<(), ScreenerError> {
        let bucket = bucket_start(tick.timestamp, self.bucket_width);
        let mut data = self.data.lock().map_err(ScreenerError::poisoned)?;

        data.entry(tick.instrument.clone())
            .or_default()
            .entry(bucket)
            .and_modify(|partial| partial.merge(tick))
            .or_insert_with(|| PartialCandle::seed(bucket, tick));

        Ok(())
    }

    /// Remove the partial candle for exactly `bucket`
    ///
    /// Older buckets of the same instrument can never be promoted anymore
    /// and are dropped in the same critical section. Newer ones stay.
    pub fn take(&self, instrument: &str, bucket: DateTime<Utc>) -> Result<Taken, ScreenerError> {
        let mut data = self.data.lock().map_err(ScreenerError::poisoned)?;

        let Some(buckets) = data.get_mut(instrument) else {
            return Ok(Taken::default());
        };

        let partial = buckets.remove(&bucket);
        let newer = buckets.split_off(&bucket);
        let stale_dropped = buckets.len();
        *buckets = newer;

        if buckets.is_empty() {
            data.remove(instrument);
        }

        Ok(Taken {
            partial,
            stale_dropped,
        })
    }

    /// Snapshot of the partial candle for a bucket, if any
    pub fn partial(
        &self,
        instrument: &str,
        bucket: DateTime<Utc>,
    ) -> Result<Option<PartialCandle>, ScreenerError> {
        let data = self.data.lock().map_err(ScreenerError::poisoned)?;
        Ok(data.get(instrument).and_then(|b| b.get(&bucket)).cloned())
    }

    /// Number of partial candles currently buffered
    pub fn pending_count(&self) -> Result<usize, ScreenerError> {
        let data = self.data.lock().map_err(ScreenerError::poisoned)?;
        Ok(data.values().map(|b| b.len()).sum())
    }

    /// Discard every partial candle, returning how many were dropped
    pub fn clear(&self) -> Result<usize, ScreenerError> {
        let mut data = self.data.lock().map_err(ScreenerError::poisoned)?;
        let dropped = data.values().map(|b| b.len()).sum();
        data.clear();
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, h, m, s).unwrap()
    }

    fn create_test_tick(ts: DateTime<Utc>, high: f64, low: f64, close: f64, volume: f64) -> Tick {
        Tick {
            instrument: "RELIANCE-EQ".to_string(),
            timestamp: ts,
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn test_bucket_start_truncates_to_minute() {
        let ts = at(4, 17, 42) + Duration::milliseconds(250);
        assert_eq!(bucket_start(ts, Duration::seconds(60)), at(4, 17, 0));
        assert_eq!(bucket_start(at(4, 17, 0), Duration::seconds(60)), at(4, 17, 0));
    }

    #[test]
    fn test_bucket_start_generic_width() {
        assert_eq!(bucket_start(at(4, 17, 42), Duration::minutes(5)), at(4, 15, 0));
    }

    #[test]
    fn test_first_tick_seeds_candle() {
        let buffer = TickBuffer::new(Duration::seconds(60));
        let tick = Tick {
            instrument: "RELIANCE-EQ".to_string(),
            timestamp: at(4, 0, 5),
            open: 2500.0,
            high: 2510.0,
            low: 2495.0,
            close: 2505.0,
            volume: 300.0,
        };
        buffer.ingest(&tick).unwrap();

        let partial = buffer.partial("RELIANCE-EQ", at(4, 0, 0)).unwrap().unwrap();
        assert_eq!(partial.open, 2500.0);
        assert_eq!(partial.high, 2510.0);
        assert_eq!(partial.low, 2495.0);
        assert_eq!(partial.close, 2505.0);
        assert_eq!(partial.volume, 300.0);
    }

    #[test]
    fn test_duplicate_tick_double_counts_volume() {
        let buffer = TickBuffer::new(Duration::seconds(60));
        let tick = create_test_tick(at(4, 0, 5), 101.0, 99.0, 100.0, 40.0);

        buffer.ingest(&tick).unwrap();
        buffer.ingest(&tick).unwrap();

        let partial = buffer.partial("RELIANCE-EQ", at(4, 0, 0)).unwrap().unwrap();
        assert_eq!(partial.volume, 80.0);
        assert_eq!(buffer.pending_count().unwrap(), 1);
    }

    #[test]
    fn test_merge_ohlc_in_arrival_order() {
        let buffer = TickBuffer::new(Duration::seconds(60));
        let mut first = create_test_tick(at(4, 0, 1), 101.0, 99.0, 100.0, 10.0);
        first.open = 99.5;
        let ticks = vec![
            first,
            create_test_tick(at(4, 0, 20), 104.0, 100.0, 103.0, 20.0),
            create_test_tick(at(4, 0, 40), 103.5, 97.0, 98.0, 30.0),
        ];

        for tick in &ticks {
            buffer.ingest(tick).unwrap();
        }

        let partial = buffer.partial("RELIANCE-EQ", at(4, 0, 0)).unwrap().unwrap();
        assert_eq!(partial.open, 99.5);
        assert_eq!(partial.high, 104.0);
        assert_eq!(partial.low, 97.0);
        assert_eq!(partial.close, 98.0);
        assert_eq!(partial.volume, 60.0);
    }

    #[test]
    fn test_merge_reversed_order_changes_only_open_and_close() {
        let buffer = TickBuffer::new(Duration::seconds(60));
        let ticks = vec![
            create_test_tick(at(4, 0, 40), 103.5, 97.0, 98.0, 30.0),
            create_test_tick(at(4, 0, 20), 104.0, 100.0, 103.0, 20.0),
            create_test_tick(at(4, 0, 1), 101.0, 99.0, 100.0, 10.0),
        ];

        for tick in &ticks {
            buffer.ingest(tick).unwrap();
        }

        let partial = buffer.partial("RELIANCE-EQ", at(4, 0, 0)).unwrap().unwrap();
        assert_eq!(partial.high, 104.0);
        assert_eq!(partial.low, 97.0);
        assert_eq!(partial.volume, 60.0);
        // open comes from the first arrival, close from the last one
        assert_eq!(partial.open, 98.0);
        assert_eq!(partial.close, 100.0);
    }

    #[test]
    fn test_ticks_in_different_buckets_stay_apart() {
        let buffer = TickBuffer::new(Duration::seconds(60));
        buffer
            .ingest(&create_test_tick(at(4, 0, 59), 101.0, 99.0, 100.0, 1.0))
            .unwrap();
        buffer
            .ingest(&create_test_tick(at(4, 1, 0), 102.0, 100.0, 101.0, 1.0))
            .unwrap();

        assert_eq!(buffer.pending_count().unwrap(), 2);
    }

    #[test]
    fn test_take_removes_bucket_and_drops_stale() {
        let buffer = TickBuffer::new(Duration::seconds(60));
        for (m, s) in [(0, 10), (1, 10), (2, 10), (3, 10)] {
            buffer
                .ingest(&create_test_tick(at(4, m, s), 101.0, 99.0, 100.0, 1.0))
                .unwrap();
        }

        let taken = buffer.take("RELIANCE-EQ", at(4, 2, 0)).unwrap();
        assert!(taken.partial.is_some());
        assert_eq!(taken.stale_dropped, 2);

        // The newer bucket survives
        assert_eq!(buffer.pending_count().unwrap(), 1);
        assert!(buffer.partial("RELIANCE-EQ", at(4, 3, 0)).unwrap().is_some());
    }

    #[test]
    fn test_take_missing_instrument_is_noop() {
        let buffer = TickBuffer::new(Duration::seconds(60));
        let taken = buffer.take("TCS-EQ", at(4, 0, 0)).unwrap();
        assert!(taken.partial.is_none());
        assert_eq!(taken.stale_dropped, 0);
    }

    #[test]
    fn test_late_tick_starts_new_partial() {
        let buffer = TickBuffer::new(Duration::seconds(60));
        let tick = create_test_tick(at(4, 0, 10), 101.0, 99.0, 100.0, 5.0);
        buffer.ingest(&tick).unwrap();
        buffer.take("RELIANCE-EQ", at(4, 0, 0)).unwrap();

        buffer.ingest(&tick).unwrap();
        let partial = buffer.partial("RELIANCE-EQ", at(4, 0, 0)).unwrap().unwrap();
        assert_eq!(partial.volume, 5.0);
    }

    #[test]
    fn test_clear() {
        let buffer = TickBuffer::new(Duration::seconds(60));
        buffer
            .ingest(&create_test_tick(at(4, 0, 10), 101.0, 99.0, 100.0, 5.0))
            .unwrap();

        assert_eq!(buffer.clear().unwrap(), 1);
        assert_eq!(buffer.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::thread;

        let buffer = TickBuffer::new(Duration::seconds(60));
        let buffer_clone = buffer.clone();

        let handle = thread::spawn(move || {
            for _ in 0..500 {
                buffer_clone
                    .ingest(&create_test_tick(at(4, 0, 10), 101.0, 99.0, 100.0, 1.0))
                    .unwrap();
            }
        });

        for _ in 0..500 {
            buffer
                .ingest(&create_test_tick(at(4, 0, 20), 101.0, 99.0, 100.0, 1.0))
                .unwrap();
        }

        handle.join().unwrap();

        let partial = buffer.partial("RELIANCE-EQ", at(4, 0, 0)).unwrap().unwrap();
        assert_eq!(partial.volume, 1000.0);
    }
}
