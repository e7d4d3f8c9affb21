//! Audio engine abstraction
//!
//! The engine is a single audio element: one source, a play head, a volume.
//! Commands are fire-and-forget except `play`, whose result arrives later.
//! The engine reports what actually happened through `EngineEvent`s on a
//! channel handed to whoever owns the controller.

use futures::future::BoxFuture;
use thiserror::Error;

/// Why the engine refused to play
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The source could not be decoded
    #[error("decode failure: {0}")]
    Decode(String),

    /// Playback blocked by platform policy (e.g. autoplay restrictions)
    #[error("playback not allowed: {0}")]
    NotAllowed(String),

    /// The source could not be fetched
    #[error("network failure: {0}")]
    Network(String),

    /// The request was interrupted by a later pause or source change
    #[error("play request aborted")]
    Aborted,
}

/// Notifications emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Play head moved; `duration` is NaN or 0 until the engine knows it
    TimeUpdate { current_time: f64, duration: f64 },
    /// Reached the end of the source
    Ended,
    /// Engine started playing
    Play,
    /// Engine paused
    Pause,
    VolumeChange { volume: f64 },
}

/// External audio playback collaborator
pub trait AudioEngine: Send {
    /// Currently set source locator
    fn source(&self) -> Option<&str>;

    fn set_source(&mut self, url: &str);

    /// Begin playback; the returned future resolves when the engine has
    /// accepted or rejected the request
    fn play(&mut self) -> BoxFuture<'static, Result<(), EngineError>>;

    fn pause(&mut self);

    /// Move the play head; clamping out-of-range values is up to the engine
    fn set_current_time(&mut self, seconds: f64);

    fn set_volume(&mut self, level: f64);
}
