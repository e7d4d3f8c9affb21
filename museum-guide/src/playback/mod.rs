//! Audio playback coordination

pub mod controller;
pub mod engine;
pub mod snapshot;

pub use controller::PlaybackController;
pub use engine::{AudioEngine, EngineError, EngineEvent};
pub use snapshot::PlaybackSnapshot;
