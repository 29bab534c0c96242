use crate::models::{ReferenceBook, ReferenceLevels, Tick};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Session shape simulated for one instrument
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionScenario {
    /// Opens above the prior high and keeps climbing
    GapUp,
    /// Opens below the prior low and keeps falling
    GapDown,
    /// Mean-reverting inside the prior range
    Sideways,
}

#[derive(Debug, Clone)]
struct InstrumentWalk {
    instrument: String,
    scenario: SessionScenario,
    base_price: f64,
    price: f64,
}

/// Generates seeded random-walk ticks for a fixed universe
///
/// Scenarios are assigned round-robin (gap up, gap down, sideways) so a
/// simulated session always contains both signal directions.
pub struct SyntheticTickGenerator {
    rng: StdRng,
    walks: Vec<InstrumentWalk>,
}

impl SyntheticTickGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(universe: &[String], seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let walks = universe
            .iter()
            .enumerate()
            .map(|(i, instrument)| {
                let scenario = match i % 3 {
                    0 => SessionScenario::GapUp,
                    1 => SessionScenario::GapDown,
                    _ => SessionScenario::Sideways,
                };
                let base_price = rng.gen_range(100.0..5000.0);
                InstrumentWalk {
                    instrument: instrument.clone(),
                    scenario,
                    base_price,
                    price: base_price,
                }
            })
            .collect();

        Self { rng, walks }
    }

    pub fn scenario(&self, instrument: &str) -> Option<SessionScenario> {
        self.walks
            .iter()
            .find(|w| w.instrument == instrument)
            .map(|w| w.scenario)
    }

    /// Prior-session levels consistent with each instrument's scenario
    pub fn reference_levels(&self) -> ReferenceBook {
        self.walks
            .iter()
            .map(|walk| {
                let base = walk.base_price;
                let levels = match walk.scenario {
                    SessionScenario::GapUp => ReferenceLevels {
                        high: base * 0.99,
                        low: base * 0.97,
                    },
                    SessionScenario::GapDown => ReferenceLevels {
                        high: base * 1.03,
                        low: base * 1.01,
                    },
                    SessionScenario::Sideways => ReferenceLevels {
                        high: base * 1.01,
                        low: base * 0.99,
                    },
                };
                (walk.instrument.clone(), levels)
            })
            .collect()
    }

    /// One tick per instrument at `timestamp`
    pub fn next_ticks(&mut self, timestamp: DateTime<Utc>) -> Vec<Tick> {
        let mut ticks = Vec::with_capacity(self.walks.len());

        for walk in &mut self.walks {
            let previous = walk.price;

            let drift = match walk.scenario {
                SessionScenario::GapUp => previous * 0.0004,
                SessionScenario::GapDown => -previous * 0.0004,
                SessionScenario::Sideways => (walk.base_price - previous) * 0.1,
            };
            let noise = previous * self.rng.gen_range(-0.0003..0.0003); // ±0.03%
            walk.price = previous + drift + noise;

            let wick = previous * self.rng.gen_range(0.0..0.0002);
            ticks.push(Tick {
                instrument: walk.instrument.clone(),
                timestamp,
                open: previous,
                high: previous.max(walk.price) + wick,
                low: previous.min(walk.price) - wick,
                close: walk.price,
                volume: self.rng.gen_range(1.0..500.0_f64).round(),
            });
        }

        ticks
    }
}

/// Live feed source emitting synthetic ticks on a fixed interval
pub struct SyntheticFeed {
    generator: SyntheticTickGenerator,
    every: Duration,
}

impl SyntheticFeed {
    pub fn new(generator: SyntheticTickGenerator, every: Duration) -> Self {
        Self { generator, every }
    }

    pub async fn run(mut self, tx: mpsc::Sender<Tick>, cancel: CancellationToken) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            for tick in self.generator.next_ticks(Utc::now()) {
                if tx.send(tick).await.is_err() {
                    tracing::warn!("Tick channel closed, stopping synthetic feed");
                    return;
                }
            }
        }

        tracing::info!("Synthetic feed stopped");
    }
}
