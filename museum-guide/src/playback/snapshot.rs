//! Immutable playback state snapshot

use museum_common::catalog::Track;
use museum_common::events::PlayerStatus;
use std::sync::Arc;

/// Full playback state as seen by subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub status: PlayerStatus,
    pub is_playing: bool,
    pub current_track: Option<Arc<Track>>,
    /// Play head in seconds
    pub current_time: f64,
    /// Track length in seconds; 0 until known
    pub duration: f64,
    /// Output volume, always within 0.0-1.0
    pub volume: f64,
}

impl PlaybackSnapshot {
    pub fn new(volume: f64) -> Self {
        Self {
            status: PlayerStatus::Idle,
            is_playing: false,
            current_track: None,
            current_time: 0.0,
            duration: 0.0,
            volume: clamp_volume(volume),
        }
    }

    pub fn track_id(&self) -> Option<&str> {
        self.current_track.as_ref().map(|t| t.id.as_str())
    }
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Clamp to 0.0-1.0; NaN becomes 0.0
pub fn clamp_volume(level: f64) -> f64 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}
