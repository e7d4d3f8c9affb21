//! Position source abstraction
//!
//! A platform positioning service (GNSS receiver, OS location API, a
//! recorded trace) is wrapped behind `PositionSource`. Continuous updates are
//! delivered on an unbounded channel so the source never waits for the
//! tracker; the tracker drains the channel one fix at a time.

use crate::position::RawFix;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Errors reported by a position source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The visitor or the platform refused access to location
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The source is present but cannot currently produce a fix
    #[error("position unavailable: {0}")]
    Unavailable(String),

    /// No fix arrived within the acquisition budget
    #[error("no position fix within {0:?}")]
    Timeout(Duration),
}

/// Options passed to the source when requesting continuous updates
#[derive(Debug, Clone, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Budget for the first fix
    pub timeout: Duration,
    /// Oldest cached fix the source may return (zero = always fresh)
    pub max_staleness: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(5),
            max_staleness: Duration::ZERO,
        }
    }
}

impl From<&museum_common::config::TrackingConfig> for WatchOptions {
    fn from(config: &museum_common::config::TrackingConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            timeout: config.first_fix_timeout(),
            max_staleness: config.max_staleness(),
        }
    }
}

/// Opaque identifier of one continuous-update request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl SubscriptionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Item delivered on a subscription stream
pub type FixResult = Result<RawFix, SourceError>;

/// A live continuous-update request
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub fixes: mpsc::UnboundedReceiver<FixResult>,
}

/// External positioning collaborator
pub trait PositionSource: Send {
    /// False when the platform has no positioning capability at all
    fn is_supported(&self) -> bool;

    /// Start continuous updates
    fn request_continuous_updates(
        &mut self,
        options: &WatchOptions,
    ) -> Result<Subscription, SourceError>;

    /// Stop the updates of a subscription; unknown handles are ignored
    fn cancel(&mut self, handle: SubscriptionHandle);
}
