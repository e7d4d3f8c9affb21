//! Event types for the guide event system
//!
//! Provides the discrete notification vocabulary (`GuideEvent`) and the
//! `EventBus` that distributes it. Continuous state (playback snapshot,
//! current room, current position) is published separately through
//! last-value-cached channels; the bus carries the things that *happen*:
//! tracking lifecycle, room entries, track offers and playback failures.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Playback state machine status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    /// No track loaded
    #[default]
    Idle,
    /// Track set, not playing
    Loaded,
    Playing,
    Paused,
}

impl std::fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerStatus::Idle => write!(f, "idle"),
            PlayerStatus::Loaded => write!(f, "loaded"),
            PlayerStatus::Playing => write!(f, "playing"),
            PlayerStatus::Paused => write!(f, "paused"),
        }
    }
}

/// Guide event types
///
/// Events are broadcast via EventBus and serialize with a `type` tag so they
/// can be written out as JSON lines by the replay tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GuideEvent {
    /// First position fix obtained; continuous tracking is running
    TrackingStarted {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Tracking could not be started
    ///
    /// When `retryable` is false the platform has no position source and the
    /// visitor should fall back to manual room selection.
    TrackingUnavailable {
        reason: String,
        retryable: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Tracking was cancelled
    TrackingStopped {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Visitor entered a room (detected or selected manually)
    RoomEntered {
        room_id: String,
        room_name: String,
        /// Room the visitor was in before, if any
        previous_room_id: Option<String>,
        /// True when the room was selected by hand instead of detected
        manual: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The room's narration track is offered to the visitor
    TrackOffered {
        room_id: String,
        track_id: String,
        track_title: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Player moved between state machine states
    PlaybackStatusChanged {
        old_status: PlayerStatus,
        new_status: PlayerStatus,
        track_id: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Current track played through to the end
    TrackEnded {
        track_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A play request was rejected (by the controller or the audio engine)
    PlaybackFailed {
        track_id: Option<String>,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl GuideEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            GuideEvent::TrackingStarted { .. } => "TrackingStarted",
            GuideEvent::TrackingUnavailable { .. } => "TrackingUnavailable",
            GuideEvent::TrackingStopped { .. } => "TrackingStopped",
            GuideEvent::RoomEntered { .. } => "RoomEntered",
            GuideEvent::TrackOffered { .. } => "TrackOffered",
            GuideEvent::PlaybackStatusChanged { .. } => "PlaybackStatusChanged",
            GuideEvent::TrackEnded { .. } => "TrackEnded",
            GuideEvent::PlaybackFailed { .. } => "PlaybackFailed",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use museum_common::events::{EventBus, GuideEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(GuideEvent::TrackingStarted {
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(GuideEvent::TrackingStarted { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GuideEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<GuideEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: GuideEvent,
    ) -> Result<usize, broadcast::error::SendError<GuideEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: GuideEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
