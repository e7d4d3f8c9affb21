//! Position tracking
//!
//! `PositionTracker` owns the lifecycle of a continuous position
//! subscription and the `RoomResolver` fed by it. Each sample is validated,
//! published on the current-position stream and pushed into the resolver.
//!
//! Lifecycle: `Stopped` → (`begin_tracking`) → `Acquiring` → first valid fix
//! → `Tracking` → (`stop_tracking`) → `Stopped`. A source error, a closed
//! stream or an expired deadline while acquiring returns to `Stopped`.

pub mod source;

pub use source::{
    FixResult, PositionSource, SourceError, Subscription, SubscriptionHandle, WatchOptions,
};

use crate::error::{Error, Result};
use crate::observable::Observable;
use crate::position::{InvalidFix, Position, RawFix};
use crate::resolver::{RoomChange, RoomResolver};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

enum TrackerState {
    Stopped,
    Acquiring {
        handle: SubscriptionHandle,
        fixes: mpsc::UnboundedReceiver<FixResult>,
        deadline: Instant,
    },
    Tracking {
        handle: SubscriptionHandle,
        fixes: mpsc::UnboundedReceiver<FixResult>,
    },
}

/// Result of processing one valid sample
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub position: Position,
    pub room_change: Option<RoomChange>,
    /// True for the fix that completed acquisition
    pub first_fix: bool,
}

pub struct PositionTracker {
    source: Box<dyn PositionSource>,
    options: WatchOptions,
    max_accuracy_m: Option<f64>,
    resolver: RoomResolver,
    position: Observable<Option<Position>>,
    state: TrackerState,
}

impl PositionTracker {
    pub fn new(source: Box<dyn PositionSource>, resolver: RoomResolver, options: WatchOptions) -> Self {
        Self {
            source,
            options,
            max_accuracy_m: None,
            resolver,
            position: Observable::new(None),
            state: TrackerState::Stopped,
        }
    }

    /// Drop samples whose reported error radius exceeds `limit` meters
    pub fn with_max_accuracy(mut self, limit: Option<f64>) -> Self {
        self.max_accuracy_m = limit;
        self
    }

    /// Start tracking and wait for the first valid fix
    ///
    /// Resolves once the first fix has been processed and returns the room
    /// change it caused, if any. Calling it while already tracking is a no-op.
    ///
    /// # Errors
    /// - `Error::Unsupported` if the source has no positioning capability
    /// - `Error::Acquisition` if the source fails or no fix arrives in time
    pub async fn start_tracking(&mut self) -> Result<Option<RoomChange>> {
        if self.is_tracking() {
            debug!("start_tracking called while already tracking");
            return Ok(None);
        }
        if !self.is_acquiring() {
            self.begin_tracking()?;
        }

        loop {
            let Some(deadline) = self.acquisition_deadline() else {
                return Ok(None);
            };
            let item = match tokio::time::timeout_at(deadline, self.next_fix()).await {
                Ok(item) => item,
                Err(_) => return Err(self.expire_acquisition()),
            };
            if let Some(outcome) = self.handle_fix(item)? {
                return Ok(outcome.room_change);
            }
        }
    }

    /// Request continuous updates without waiting for the first fix
    ///
    /// The tracker enters the acquiring state; the caller drives it with
    /// `next_fix`/`handle_fix` and calls `expire_acquisition` once
    /// `acquisition_deadline` has passed.
    pub fn begin_tracking(&mut self) -> Result<()> {
        if !matches!(self.state, TrackerState::Stopped) {
            return Ok(());
        }
        if !self.source.is_supported() {
            warn!("Position source not supported on this platform");
            return Err(Error::Unsupported(
                "no position source available on this platform".to_string(),
            ));
        }

        let Subscription { handle, fixes } = self
            .source
            .request_continuous_updates(&self.options)
            .map_err(|e| {
                warn!("Position source refused continuous updates: {}", e);
                Error::Acquisition(e)
            })?;

        info!(
            %handle,
            high_accuracy = self.options.high_accuracy,
            timeout_ms = self.options.timeout.as_millis() as u64,
            "Requested continuous position updates"
        );
        self.state = TrackerState::Acquiring {
            handle,
            fixes,
            deadline: Instant::now() + self.options.timeout,
        };
        Ok(())
    }

    /// Next item from the live subscription, in arrival order
    ///
    /// Never resolves while stopped, so it can sit in a `select!` loop.
    /// `None` means the source closed the stream.
    pub async fn next_fix(&mut self) -> Option<FixResult> {
        match &mut self.state {
            TrackerState::Acquiring { fixes, .. } | TrackerState::Tracking { fixes, .. } => {
                fixes.recv().await
            }
            TrackerState::Stopped => std::future::pending().await,
        }
    }

    /// Process one item from the subscription stream
    ///
    /// Returns the outcome for a valid sample, `None` for items that were
    /// logged and dropped. Errors only while acquiring: a source error or a
    /// closed stream before the first fix fails acquisition.
    pub fn handle_fix(&mut self, item: Option<FixResult>) -> Result<Option<SampleOutcome>> {
        match item {
            None => {
                let was_acquiring = self.is_acquiring();
                self.state = TrackerState::Stopped;
                if was_acquiring {
                    warn!("Position stream closed before the first fix");
                    return Err(Error::Acquisition(SourceError::Unavailable(
                        "position stream closed".to_string(),
                    )));
                }
                warn!("Position stream closed by source");
                Ok(None)
            }
            Some(Err(e)) => {
                if self.is_acquiring() {
                    warn!("Position source error before first fix: {}", e);
                    self.cancel_subscription();
                    return Err(Error::Acquisition(e));
                }
                warn!("Position source error (dropped): {}", e);
                Ok(None)
            }
            Some(Ok(fix)) => Ok(self.handle_sample(fix)),
        }
    }

    /// Validate a raw fix, publish it and resolve the room
    pub fn handle_sample(&mut self, fix: RawFix) -> Option<SampleOutcome> {
        let position = match self.validate(fix) {
            Ok(position) => position,
            Err(reason) => {
                warn!("Dropping position sample: {}", reason);
                return None;
            }
        };

        let first_fix = if let TrackerState::Acquiring { .. } = self.state {
            self.promote_to_tracking();
            true
        } else {
            false
        };

        debug!(
            lat = position.latitude,
            lon = position.longitude,
            accuracy_m = position.accuracy,
            "Position sample"
        );
        self.position.publish(Some(position));
        let room_change = self.resolver.update(&position);

        Some(SampleOutcome {
            position,
            room_change,
            first_fix,
        })
    }

    fn validate(&self, fix: RawFix) -> std::result::Result<Position, InvalidFix> {
        let position = Position::from_fix(fix)?;
        if let Some(limit) = self.max_accuracy_m {
            if position.accuracy > limit {
                return Err(InvalidFix::TooInaccurate {
                    accuracy: position.accuracy,
                    limit,
                });
            }
        }
        Ok(position)
    }

    fn promote_to_tracking(&mut self) {
        let state = std::mem::replace(&mut self.state, TrackerState::Stopped);
        self.state = match state {
            TrackerState::Acquiring { handle, fixes, .. } => {
                info!(%handle, "First position fix acquired");
                TrackerState::Tracking { handle, fixes }
            }
            other => other,
        };
    }

    /// Deadline for the first fix while acquiring
    pub fn acquisition_deadline(&self) -> Option<Instant> {
        match &self.state {
            TrackerState::Acquiring { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    /// Give up on acquisition after the deadline; returns the error to report
    pub fn expire_acquisition(&mut self) -> Error {
        warn!(
            timeout_ms = self.options.timeout.as_millis() as u64,
            "No position fix within acquisition timeout"
        );
        self.cancel_subscription();
        Error::Acquisition(SourceError::Timeout(self.options.timeout))
    }

    /// Cancel tracking and clear the current position and room
    ///
    /// Idempotent. Returns true if a subscription was active. The position
    /// and room left behind by a stream the source closed are cleared too.
    /// Samples still queued on the dropped stream are never delivered.
    pub fn stop_tracking(&mut self) -> bool {
        let was_live = self.cancel_subscription();
        if self.position.with(|p| p.is_some()) {
            self.position.publish(None);
        }
        let had_room = self.resolver.clear();
        if was_live {
            info!("Position tracking stopped");
        } else if had_room {
            debug!("Cleared room left by a closed position stream");
        }
        was_live
    }

    fn cancel_subscription(&mut self) -> bool {
        match std::mem::replace(&mut self.state, TrackerState::Stopped) {
            TrackerState::Stopped => false,
            TrackerState::Acquiring { handle, .. } | TrackerState::Tracking { handle, .. } => {
                self.source.cancel(handle);
                debug!(%handle, "Cancelled position subscription");
                true
            }
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, TrackerState::Tracking { .. })
    }

    pub fn is_acquiring(&self) -> bool {
        matches!(self.state, TrackerState::Acquiring { .. })
    }

    pub fn current_position(&self) -> Option<Position> {
        self.position.get()
    }

    /// Last-value-cached stream of the current position
    pub fn subscribe_position(&self) -> watch::Receiver<Option<Position>> {
        self.position.subscribe()
    }

    pub fn resolver(&self) -> &RoomResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut RoomResolver {
        &mut self.resolver
    }
}

impl Drop for PositionTracker {
    fn drop(&mut self) {
        self.cancel_subscription();
    }
}
