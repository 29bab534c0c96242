// Market-data feed plumbing: wire decoding, feed sources, and the ingest task
pub mod ingest;
pub mod message;
pub mod replay;
pub mod synthetic;

pub use ingest::{run_ingest, tick_channel, IngestStats};
pub use message::decode_frame;
pub use replay::{replay_frames, spawn_frame_reader, ReplayFeed, ReplayStats};
pub use synthetic::{SessionScenario, SyntheticFeed, SyntheticTickGenerator};
