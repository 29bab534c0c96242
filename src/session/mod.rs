// Session lifecycle: market-hours gate, cadence loop, signal presentation
pub mod live;
pub mod market_hours;
pub mod presenter;
pub mod run_loop;

pub use live::{run_live, LiveSettings, TickSource};
pub use market_hours::{AlwaysOpen, MarketGate, MarketHours};
pub use presenter::{LogPresenter, SignalPresenter};
pub use run_loop::{until_next_boundary, CycleReport, RunLoop, RunState, RunSummary};
