//! # Museum Guide Engine (museum-guide)
//!
//! Room detection and audio playback coordination for a location-aware
//! museum audio guide.
//!
//! **Purpose:** Track the visitor's position, resolve it against circular
//! room geofences with hysteresis, and drive a single audio element through
//! a play/pause/stop state machine that publishes immutable snapshots.
//!
//! **Architecture:** One `GuideSession` task owns the `PositionTracker`
//! (which owns the `RoomResolver`) and the `PlaybackController`, and handles
//! position samples, engine events and commands one at a time.

pub mod error;
pub mod observable;
pub mod playback;
pub mod position;
pub mod replay;
pub mod resolver;
pub mod session;
pub mod simulation;
pub mod tracker;

pub use error::{Error, Result};
pub use observable::Observable;
pub use playback::{AudioEngine, EngineError, EngineEvent, PlaybackController, PlaybackSnapshot};
pub use resolver::{RoomChange, RoomResolver};
pub use session::{GuideSession, SessionHandle};
pub use position::{Position, RawFix};
pub use tracker::{PositionSource, PositionTracker, SourceError, WatchOptions};
