use super::{MarketGate, SignalPresenter};
use crate::aggregation::{bucket_start, CandleAggregator};
use crate::models::Signal;
use crate::strategy::SignalFeed;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Terminal
    Stopped,
}

/// Outcome of a single cadence cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub state: RunState,
    /// Bucket promoted this cycle; `None` when the cycle stopped the loop
    pub promoted_bucket: Option<DateTime<Utc>>,
    pub emitted: Vec<Signal>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub signals: usize,
}

/// Time until the next bucket boundary after `now`
pub fn until_next_boundary(now: DateTime<Utc>, width: chrono::Duration) -> Duration {
    let next = bucket_start(now, width) + width;
    (next - now).to_std().unwrap_or_default()
}

/// Cadence-driven loop: promote the bucket that just closed, evaluate, present
///
/// Owns the signal feed. The aggregator is shared with the ingest task.
pub struct RunLoop<G: MarketGate> {
    aggregator: Arc<CandleAggregator>,
    feed: SignalFeed,
    gate: G,
    cadence: Duration,
    grace: Duration,
    recent_signals: usize,
    cancel: CancellationToken,
    state: RunState,
    cycles: u64,
}

impl<G: MarketGate> RunLoop<G> {
    pub fn new(aggregator: Arc<CandleAggregator>, gate: G, cancel: CancellationToken) -> Self {
        Self {
            aggregator,
            feed: SignalFeed::new(),
            gate,
            cadence: Duration::from_secs(60),
            grace: Duration::from_secs(2),
            recent_signals: 10,
            cancel,
            state: RunState::Running,
            cycles: 0,
        }
    }

    pub fn with_cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    /// Delay after a bucket boundary before the first cycle fires
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_recent_signals(mut self, recent_signals: usize) -> Self {
        self.recent_signals = recent_signals;
        self
    }

    pub fn feed(&self) -> &SignalFeed {
        &self.feed
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            cycles: self.cycles,
            signals: self.feed.len().unwrap_or_default(),
        }
    }

    /// Run one cycle as of `now`
    ///
    /// The gate and the cancellation token are checked first; once either
    /// says stop, buffered partial candles are discarded and the loop is
    /// stopped for good.
    pub fn run_cycle<P>(&mut self, now: DateTime<Utc>, presenter: &P) -> CycleReport
    where
        P: SignalPresenter + ?Sized,
    {
        if self.state == RunState::Running
            && (self.cancel.is_cancelled() || !self.gate.is_open(now))
        {
            self.stop(presenter);
        }

        if self.state == RunState::Stopped {
            return CycleReport {
                state: RunState::Stopped,
                promoted_bucket: None,
                emitted: Vec::new(),
            };
        }

        self.cycles += 1;
        let width = self.aggregator.buffer().bucket_width();
        let promoted_bucket = bucket_start(now, width) - width;

        tracing::debug!(
            "⏱️  Cycle {} at {}, promoting {}",
            self.cycles,
            now.format("%H:%M:%S"),
            promoted_bucket.format("%H:%M")
        );

        let emitted = self.aggregator.promote(promoted_bucket, now);
        for signal in &emitted {
            if let Err(e) = self.feed.append(signal.clone()) {
                tracing::error!("Failed to record signal for {}: {}", signal.instrument, e);
            }
        }

        match self.feed.recent(self.recent_signals) {
            Ok(recent) => presenter.present(&recent),
            Err(e) => tracing::error!("Failed to read signal feed: {}", e),
        }

        CycleReport {
            state: RunState::Running,
            promoted_bucket: Some(promoted_bucket),
            emitted,
        }
    }

    fn stop<P>(&mut self, presenter: &P)
    where
        P: SignalPresenter + ?Sized,
    {
        self.state = RunState::Stopped;
        self.cancel.cancel();

        match self.aggregator.discard_pending() {
            Ok(dropped) if dropped > 0 => {
                tracing::info!("Discarded {} unclosed partial candle(s)", dropped);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to discard partial candles: {}", e),
        }

        presenter.stopped();
    }

    /// Drive cycles on a simulated clock covering every bucket from `first` to `last`
    ///
    /// Each cycle runs just after the boundary that closes a bucket, so no
    /// wall-clock time passes. Used for replays and simulations.
    pub fn run_simulated<P>(
        &mut self,
        first: DateTime<Utc>,
        last: DateTime<Utc>,
        presenter: &P,
    ) -> RunSummary
    where
        P: SignalPresenter + ?Sized,
    {
        let width = self.aggregator.buffer().bucket_width();
        let grace =
            chrono::Duration::from_std(self.grace).unwrap_or_else(|_| chrono::Duration::zero());
        let end = bucket_start(last, width) + width;
        let mut boundary = bucket_start(first, width) + width;

        while boundary <= end && self.state == RunState::Running {
            self.run_cycle(boundary + grace, presenter);
            boundary += width;
        }

        self.summary()
    }

    /// Drive cycles on the cadence until the gate closes or the token is cancelled
    ///
    /// The first cycle fires at the next bucket boundary plus the grace delay.
    pub async fn run<P>(&mut self, presenter: &P) -> RunSummary
    where
        P: SignalPresenter + ?Sized,
    {
        let now = Utc::now();
        if !self.gate.is_open(now) {
            tracing::info!("Market is closed at {}, not starting", now.format("%H:%M:%S"));
            self.stop(presenter);
            return self.summary();
        }

        let width = self.aggregator.buffer().bucket_width();
        let delay = until_next_boundary(now, width) + self.grace;
        tracing::info!("🔄 First cycle in {:?}, then every {:?}", delay, self.cadence);

        let mut ticker = interval_at(Instant::now() + delay, self.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.state == RunState::Running {
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = ticker.tick() => {}
            }

            self.run_cycle(Utc::now(), presenter);
        }

        let summary = self.summary();
        tracing::info!(
            "👋 Run loop stopped after {} cycle(s), {} signal(s)",
            summary.cycles,
            summary.signals
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReferenceBook, ReferenceLevels, SignalKind, Tick};
    use crate::session::AlwaysOpen;
    use crate::strategy::GapVwapStrategy;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPresenter {
        presented: Mutex<Vec<usize>>,
        stopped: AtomicBool,
    }

    impl SignalPresenter for RecordingPresenter {
        fn present(&self, recent: &[Signal]) {
            self.presented.lock().unwrap().push(recent.len());
        }

        fn stopped(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    /// Open for the first `n` checks, closed afterwards
    struct CountdownGate(AtomicUsize);

    impl MarketGate for CountdownGate {
        fn is_open(&self, _now: DateTime<Utc>) -> bool {
            self.0
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    struct ClosedGate;

    impl MarketGate for ClosedGate {
        fn is_open(&self, _now: DateTime<Utc>) -> bool {
            false
        }
    }

    fn at(m: i64, s: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 3, 45, 0).unwrap()
            + chrono::Duration::minutes(m)
            + chrono::Duration::seconds(s)
    }

    fn create_aggregator() -> Arc<CandleAggregator> {
        Arc::new(CandleAggregator::new(
            vec!["SBIN-EQ".to_string()],
            chrono::Duration::seconds(60),
            30,
            ReferenceBook::from([(
                "SBIN-EQ".to_string(),
                ReferenceLevels {
                    high: 100.0,
                    low: 95.0,
                },
            )]),
            Arc::new(GapVwapStrategy::default()),
        ))
    }

    fn create_tick(ts: DateTime<Utc>, price: f64) -> Tick {
        Tick {
            instrument: "SBIN-EQ".to_string(),
            timestamp: ts,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 50.0,
        }
    }

    #[test]
    fn test_until_next_boundary() {
        let width = chrono::Duration::seconds(60);
        assert_eq!(until_next_boundary(at(0, 45), width), Duration::from_secs(15));
        assert_eq!(until_next_boundary(at(0, 0), width), Duration::from_secs(60));
    }

    #[test]
    fn test_cycle_promotes_just_closed_bucket() {
        let aggregator = create_aggregator();
        aggregator.ingest(&create_tick(at(0, 30), 101.0)).unwrap();
        aggregator.ingest(&create_tick(at(1, 1), 102.0)).unwrap();

        let presenter = RecordingPresenter::default();
        let mut run_loop = RunLoop::new(aggregator.clone(), AlwaysOpen, CancellationToken::new());

        let report = run_loop.run_cycle(at(1, 2), &presenter);
        assert_eq!(report.state, RunState::Running);
        assert_eq!(report.promoted_bucket, Some(at(0, 0)));

        // Only the closed bucket moved; the current one keeps accumulating
        assert_eq!(aggregator.history().len("SBIN-EQ").unwrap(), 1);
        assert_eq!(aggregator.buffer().pending_count().unwrap(), 1);
        assert_eq!(*presenter.presented.lock().unwrap(), vec![0]);
    }

    #[test]
    fn test_five_cycles_emit_signal_into_feed() {
        let aggregator = create_aggregator();
        let presenter = RecordingPresenter::default();
        let mut run_loop = RunLoop::new(aggregator.clone(), AlwaysOpen, CancellationToken::new())
            .with_recent_signals(10);

        let mut emitted = Vec::new();
        for m in 0..5 {
            aggregator
                .ingest(&create_tick(at(m, 10), 101.0 + m as f64))
                .unwrap();
            emitted.extend(run_loop.run_cycle(at(m + 1, 2), &presenter).emitted);
        }

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].kind, SignalKind::GapUpBullish);
        assert_eq!(emitted[0].emitted_at, at(5, 2));
        assert_eq!(run_loop.feed().len().unwrap(), 1);
        assert_eq!(*presenter.presented.lock().unwrap(), vec![0, 0, 0, 0, 1]);
        assert_eq!(run_loop.summary(), RunSummary { cycles: 5, signals: 1 });
    }

    #[test]
    fn test_gate_close_stops_and_discards() {
        let aggregator = create_aggregator();
        let cancel = CancellationToken::new();
        let presenter = RecordingPresenter::default();
        let mut run_loop = RunLoop::new(
            aggregator.clone(),
            CountdownGate(AtomicUsize::new(1)),
            cancel.clone(),
        );

        assert_eq!(run_loop.run_cycle(at(1, 2), &presenter).state, RunState::Running);

        aggregator.ingest(&create_tick(at(1, 30), 101.0)).unwrap();
        let report = run_loop.run_cycle(at(2, 2), &presenter);

        assert_eq!(report.state, RunState::Stopped);
        assert!(report.promoted_bucket.is_none());
        assert!(presenter.stopped.load(Ordering::SeqCst));
        assert!(cancel.is_cancelled());
        assert_eq!(aggregator.buffer().pending_count().unwrap(), 0);
        assert_eq!(aggregator.history().len("SBIN-EQ").unwrap(), 0);

        // Terminal: a later cycle does nothing, even if ticks show up
        aggregator.ingest(&create_tick(at(2, 30), 101.0)).unwrap();
        assert_eq!(run_loop.run_cycle(at(3, 2), &presenter).state, RunState::Stopped);
        assert_eq!(aggregator.history().len("SBIN-EQ").unwrap(), 0);
    }

    #[test]
    fn test_cancelled_token_stops_cycle() {
        let cancel = CancellationToken::new();
        let presenter = RecordingPresenter::default();
        let mut run_loop = RunLoop::new(create_aggregator(), AlwaysOpen, cancel.clone());

        cancel.cancel();
        let report = run_loop.run_cycle(at(1, 2), &presenter);

        assert_eq!(report.state, RunState::Stopped);
        assert!(presenter.presented.lock().unwrap().is_empty());
    }

    #[test]
    fn test_run_simulated_covers_every_bucket() {
        let aggregator = create_aggregator();
        for m in 0..10 {
            aggregator
                .ingest(&create_tick(at(m, 59), 101.0 + m as f64))
                .unwrap();
        }

        let presenter = RecordingPresenter::default();
        let mut run_loop = RunLoop::new(aggregator.clone(), AlwaysOpen, CancellationToken::new());
        let summary = run_loop.run_simulated(at(0, 5), at(9, 59), &presenter);

        assert_eq!(summary, RunSummary { cycles: 10, signals: 2 });
        assert_eq!(aggregator.history().len("SBIN-EQ").unwrap(), 10);
        assert_eq!(aggregator.buffer().pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_does_not_start_when_closed() {
        let presenter = RecordingPresenter::default();
        let mut run_loop = RunLoop::new(create_aggregator(), ClosedGate, CancellationToken::new());

        let summary = run_loop.run(&presenter).await;

        assert_eq!(summary, RunSummary::default());
        assert_eq!(run_loop.state(), RunState::Stopped);
        assert!(presenter.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_on_cancel() {
        let cancel = CancellationToken::new();
        let presenter = RecordingPresenter::default();
        let mut run_loop = RunLoop::new(create_aggregator(), AlwaysOpen, cancel.clone())
            .with_cadence(Duration::from_secs(3600))
            .with_grace(Duration::from_secs(3600));

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let summary = run_loop.run(&presenter).await;
        canceller.await.unwrap();

        assert_eq!(summary.cycles, 0);
        assert_eq!(run_loop.state(), RunState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_gate_closes() {
        let presenter = RecordingPresenter::default();
        // Open for the start check and two cycles
        let mut run_loop = RunLoop::new(
            create_aggregator(),
            CountdownGate(AtomicUsize::new(3)),
            CancellationToken::new(),
        )
        .with_cadence(Duration::from_millis(5))
        .with_grace(Duration::ZERO);

        let summary = tokio::time::timeout(Duration::from_secs(90), run_loop.run(&presenter))
            .await
            .unwrap();

        assert_eq!(summary.cycles, 2);
        assert!(presenter.stopped.load(Ordering::SeqCst));
    }
}
