pub mod history;

pub use history::{load_reference_levels, HistoryClient, ReferenceSource, StaticReferenceSource};
