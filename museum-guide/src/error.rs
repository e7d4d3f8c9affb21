//! Error types for museum-guide
//!
//! Every fallible operation returns one of these to its caller, who decides
//! whether to retry, tell the visitor, or ignore it. Nothing here is fatal to
//! the session.

use crate::tracker::SourceError;
use thiserror::Error;

/// Main error type for museum-guide
#[derive(Error, Debug)]
pub enum Error {
    /// The platform has no position source; fall back to manual room selection
    #[error("Position tracking unsupported: {0}")]
    Unsupported(String),

    /// The first fix could not be obtained (timeout or source error)
    #[error("Position acquisition failed: {0}")]
    Acquisition(#[source] SourceError),

    /// The player has nothing to play or the audio engine rejected playback
    #[error("Playback error: {0}")]
    Playback(String),

    /// A track id does not exist in the catalog
    #[error("Track not found: {0}")]
    TrackNotFound(String),

    /// A room id does not exist in the catalog
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// The session event loop has shut down
    #[error("Guide session closed")]
    SessionClosed,

    /// Catalog, configuration or I/O error from museum-common
    #[error(transparent)]
    Common(#[from] museum_common::Error),
}

impl Error {
    /// Whether calling the same operation again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Acquisition(_) | Error::Playback(_))
    }
}

/// Convenience Result type using museum-guide Error
pub type Result<T> = std::result::Result<T, Error>;
