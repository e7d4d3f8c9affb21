//! Guide session
//!
//! The application root. One task owns the `PositionTracker` (and through
//! it the `RoomResolver`) and the `PlaybackController`, and handles commands,
//! audio engine events and position samples one at a time. Room changes turn
//! into track offers; discrete notifications go out on the `EventBus`,
//! continuous state through the watch streams.
//!
//! Nothing in the loop waits on the outside world: position acquisition is
//! driven by the loop itself, and pending `play()` requests are awaited on
//! spawned tasks that report back through the command's reply channel.

use crate::error::{Error, Result};
use crate::playback::{AudioEngine, EngineEvent, PlaybackController, PlaybackSnapshot};
use crate::position::Position;
use crate::resolver::{RoomChange, RoomResolver};
use crate::tracker::{FixResult, PositionSource, PositionTracker, SourceError, WatchOptions};
use futures::future::BoxFuture;
use museum_common::catalog::{Catalog, Room};
use museum_common::config::GuideConfig;
use museum_common::events::{EventBus, GuideEvent, PlayerStatus};
use museum_common::time;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Requests accepted by the session loop
#[derive(Debug)]
pub enum SessionCommand {
    /// Resolves once the first fix arrives or acquisition fails
    StartTracking { reply: oneshot::Sender<Result<()>> },
    /// Replies true if a subscription was active
    StopTracking { reply: oneshot::Sender<bool> },
    /// Resolves with the audio engine's verdict
    PlayTrack {
        track_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Play { reply: oneshot::Sender<Result<()>> },
    TogglePlay { reply: oneshot::Sender<Result<()>> },
    Pause { reply: oneshot::Sender<()> },
    Stop { reply: oneshot::Sender<()> },
    Seek {
        seconds: f64,
        reply: oneshot::Sender<()>,
    },
    SetVolume {
        level: f64,
        reply: oneshot::Sender<()>,
    },
    /// Replies true if the current room changed
    SelectRoom {
        room_id: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    /// Play the track offered for the current room
    AcceptOffer { reply: oneshot::Sender<Result<()>> },
    Shutdown { reply: oneshot::Sender<()> },
}

pub struct GuideSession {
    catalog: Catalog,
    tracker: PositionTracker,
    playback: PlaybackController,
    event_bus: EventBus,
    auto_play: bool,
    commands_tx: mpsc::Sender<SessionCommand>,
    commands: mpsc::Receiver<SessionCommand>,
    engine_events: mpsc::UnboundedReceiver<EngineEvent>,
    /// Callers waiting for the first fix
    pending_starts: Vec<oneshot::Sender<Result<()>>>,
    /// Track offered for the current room
    offered_track: Option<String>,
}

impl GuideSession {
    pub fn new(
        config: &GuideConfig,
        catalog: Catalog,
        source: Box<dyn PositionSource>,
        engine: Box<dyn AudioEngine>,
        engine_events: mpsc::UnboundedReceiver<EngineEvent>,
    ) -> Self {
        let resolver = RoomResolver::from_catalog(&catalog);
        let tracker = PositionTracker::new(source, resolver, WatchOptions::from(&config.tracking))
            .with_max_accuracy(config.tracking.max_accuracy_m);
        let playback = PlaybackController::new(engine, &catalog, config.playback.initial_volume);
        let (commands_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        info!(
            rooms = catalog.rooms().len(),
            tracks = catalog.tracks().len(),
            auto_play = config.playback.auto_play,
            "Guide session created"
        );

        Self {
            catalog,
            tracker,
            playback,
            event_bus: EventBus::new(config.event_bus_capacity),
            auto_play: config.playback.auto_play,
            commands_tx,
            commands,
            engine_events,
            pending_starts: Vec::new(),
            offered_track: None,
        }
    }

    /// Cloneable handle for sending commands and subscribing
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            commands: self.commands_tx.clone(),
            event_bus: self.event_bus.clone(),
            playback: self.playback.subscribe(),
            room: self.tracker.resolver().subscribe(),
            position: self.tracker.subscribe_position(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<GuideEvent> {
        self.event_bus.subscribe()
    }

    pub fn subscribe_playback(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.playback.subscribe()
    }

    pub fn subscribe_room(&self) -> watch::Receiver<Option<Arc<Room>>> {
        self.tracker.resolver().subscribe()
    }

    pub fn subscribe_position(&self) -> watch::Receiver<Option<Position>> {
        self.tracker.subscribe_position()
    }

    /// Start tracking and wait for the first fix, before the loop runs
    ///
    /// Emits `TrackingStarted` or `TrackingUnavailable`. On failure the
    /// caller decides whether to retry or fall back to manual room
    /// selection.
    pub async fn start(&mut self) -> Result<()> {
        if self.tracker.is_tracking() {
            return Ok(());
        }
        match self.tracker.start_tracking().await {
            Ok(change) => {
                self.emit(GuideEvent::TrackingStarted {
                    timestamp: time::now(),
                });
                if let Some(change) = change {
                    self.on_room_change(change);
                }
                Ok(())
            }
            Err(e) => {
                self.emit_unavailable(&e);
                Err(e)
            }
        }
    }

    /// Run the event loop until shutdown
    pub async fn run(mut self) {
        info!("Guide session running");
        while self.step().await {}
        info!("Guide session stopped");
    }

    /// Handle exactly one command, engine event, position item or deadline
    ///
    /// Returns false once the session has shut down.
    pub async fn step(&mut self) -> bool {
        let status_before = self.playback.status();
        let deadline = self.tracker.acquisition_deadline();

        let keep_running = tokio::select! {
            biased;

            command = self.commands.recv() => match command {
                Some(command) => self.handle_command(command),
                None => false,
            },

            Some(event) = self.engine_events.recv() => {
                self.on_engine_event(event);
                true
            }

            item = self.tracker.next_fix() => {
                self.on_fix(item);
                true
            }

            _ = sleep_until(deadline) => {
                let err = self.tracker.expire_acquisition();
                self.acquisition_failed(err);
                true
            }
        };

        self.emit_status_change(status_before);
        keep_running
    }

    fn handle_command(&mut self, command: SessionCommand) -> bool {
        debug!(?command, "Session command");
        match command {
            SessionCommand::StartTracking { reply } => self.begin_tracking(reply),
            SessionCommand::StopTracking { reply } => {
                let _ = reply.send(self.stop_tracking());
            }
            SessionCommand::PlayTrack { track_id, reply } => {
                let request = self.playback.play_track_by_id(&track_id);
                self.settle_play(Some(track_id), request, Some(reply));
            }
            SessionCommand::Play { reply } => {
                let request = self.playback.play();
                self.settle_play(self.current_track_id(), request, Some(reply));
            }
            SessionCommand::TogglePlay { reply } => {
                let request = self.playback.toggle_play();
                self.settle_play(self.current_track_id(), request, Some(reply));
            }
            SessionCommand::Pause { reply } => {
                self.playback.pause();
                let _ = reply.send(());
            }
            SessionCommand::Stop { reply } => {
                self.playback.stop();
                let _ = reply.send(());
            }
            SessionCommand::Seek { seconds, reply } => {
                self.playback.seek(seconds);
                let _ = reply.send(());
            }
            SessionCommand::SetVolume { level, reply } => {
                self.playback.set_volume(level);
                let _ = reply.send(());
            }
            SessionCommand::SelectRoom { room_id, reply } => {
                let result = self.tracker.resolver_mut().select_room(&room_id);
                let _ = reply.send(result.map(|change| match change {
                    Some(change) => {
                        self.on_room_change(change);
                        true
                    }
                    None => false,
                }));
            }
            SessionCommand::AcceptOffer { reply } => match self.offered_track.clone() {
                Some(track_id) => {
                    info!(track_id = %track_id, "Track offer accepted");
                    let request = self.playback.play_track_by_id(&track_id);
                    self.settle_play(Some(track_id), request, Some(reply));
                }
                None => {
                    let _ = reply.send(Err(Error::Playback("no track on offer".to_string())));
                }
            },
            SessionCommand::Shutdown { reply } => {
                info!("Guide session shutting down");
                self.stop_tracking();
                self.playback.pause();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn current_track_id(&self) -> Option<String> {
        self.playback.snapshot().track_id().map(str::to_string)
    }

    /// Await a play request off the loop and report its verdict
    fn settle_play(
        &self,
        track_id: Option<String>,
        request: BoxFuture<'static, Result<()>>,
        reply: Option<oneshot::Sender<Result<()>>>,
    ) {
        let event_bus = self.event_bus.clone();
        tokio::spawn(async move {
            let result = request.await;
            if let Err(e) = &result {
                error!(track_id = ?track_id, "Playback failed: {}", e);
                event_bus.emit_lossy(GuideEvent::PlaybackFailed {
                    track_id,
                    message: e.to_string(),
                    timestamp: time::now(),
                });
            }
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        });
    }

    // ========================================
    // Tracking
    // ========================================

    fn begin_tracking(&mut self, reply: oneshot::Sender<Result<()>>) {
        if self.tracker.is_tracking() {
            let _ = reply.send(Ok(()));
            return;
        }
        match self.tracker.begin_tracking() {
            Ok(()) => self.pending_starts.push(reply),
            Err(e) => {
                self.emit_unavailable(&e);
                let _ = reply.send(Err(e));
            }
        }
    }

    fn stop_tracking(&mut self) -> bool {
        let stopped = self.tracker.stop_tracking();
        if stopped {
            self.fail_pending_starts(&SourceError::Unavailable("tracking stopped".to_string()));
            self.offered_track = None;
            self.emit(GuideEvent::TrackingStopped {
                timestamp: time::now(),
            });
        }
        stopped
    }

    fn on_fix(&mut self, item: Option<FixResult>) {
        let stream_closed = item.is_none();
        let was_tracking = self.tracker.is_tracking();
        match self.tracker.handle_fix(item) {
            Ok(Some(outcome)) => {
                if outcome.first_fix {
                    self.emit(GuideEvent::TrackingStarted {
                        timestamp: time::now(),
                    });
                    for reply in self.pending_starts.drain(..) {
                        let _ = reply.send(Ok(()));
                    }
                }
                if let Some(change) = outcome.room_change {
                    self.on_room_change(change);
                }
            }
            Ok(None) => {
                if stream_closed && was_tracking {
                    self.emit(GuideEvent::TrackingStopped {
                        timestamp: time::now(),
                    });
                }
            }
            Err(e) => self.acquisition_failed(e),
        }
    }

    fn acquisition_failed(&mut self, err: Error) {
        self.emit_unavailable(&err);
        let cause = match err {
            Error::Acquisition(source) => source,
            other => SourceError::Unavailable(other.to_string()),
        };
        self.fail_pending_starts(&cause);
    }

    fn fail_pending_starts(&mut self, cause: &SourceError) {
        for reply in self.pending_starts.drain(..) {
            let _ = reply.send(Err(Error::Acquisition(cause.clone())));
        }
    }

    fn emit_unavailable(&self, err: &Error) {
        warn!("Position tracking unavailable: {}", err);
        self.emit(GuideEvent::TrackingUnavailable {
            reason: err.to_string(),
            retryable: err.is_retryable(),
            timestamp: time::now(),
        });
    }

    // ========================================
    // Rooms and playback
    // ========================================

    fn on_room_change(&mut self, change: RoomChange) {
        let room = change.current;
        self.emit(GuideEvent::RoomEntered {
            room_id: room.id.clone(),
            room_name: room.name.clone(),
            previous_room_id: change.previous.map(|prev| prev.id.clone()),
            manual: change.distance_m.is_none(),
            timestamp: time::now(),
        });

        let Some(track) = self.catalog.track_for_room(&room).cloned() else {
            debug!(room_id = %room.id, "Room has no playable track");
            self.offered_track = None;
            return;
        };

        info!(room_id = %room.id, track_id = %track.id, "Offering track '{}'", track.title);
        self.offered_track = Some(track.id.clone());
        self.emit(GuideEvent::TrackOffered {
            room_id: room.id.clone(),
            track_id: track.id.clone(),
            track_title: track.title.clone(),
            timestamp: time::now(),
        });

        if self.auto_play {
            let request = self.playback.play_track_by_id(&track.id);
            self.settle_play(Some(track.id.clone()), request, None);
        }
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        let ended = matches!(event, EngineEvent::Ended);
        let track_id = self.current_track_id();
        if !self.playback.handle_engine_event(event) || !ended {
            return;
        }
        if let Some(track_id) = track_id {
            self.emit(GuideEvent::TrackEnded {
                track_id,
                timestamp: time::now(),
            });
        }
    }

    fn emit_status_change(&self, old_status: PlayerStatus) {
        let new_status = self.playback.status();
        if new_status == old_status {
            return;
        }
        debug!(%old_status, %new_status, "Playback status changed");
        self.emit(GuideEvent::PlaybackStatusChanged {
            old_status,
            new_status,
            track_id: self.current_track_id(),
            timestamp: time::now(),
        });
    }

    fn emit(&self, event: GuideEvent) {
        self.event_bus.emit_lossy(event);
    }
}

/// Sleep until the acquisition deadline; forever when there is none
async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable front end to a running `GuideSession`
///
/// Every method fails with `Error::SessionClosed` once the loop has stopped.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    event_bus: EventBus,
    playback: watch::Receiver<PlaybackSnapshot>,
    room: watch::Receiver<Option<Arc<Room>>>,
    position: watch::Receiver<Option<Position>>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::SessionClosed)?;
        response.await.map_err(|_| Error::SessionClosed)
    }

    /// Start tracking and wait for the first fix
    pub async fn start_tracking(&self) -> Result<()> {
        self.request(|reply| SessionCommand::StartTracking { reply })
            .await?
    }

    pub async fn stop_tracking(&self) -> Result<bool> {
        self.request(|reply| SessionCommand::StopTracking { reply })
            .await
    }

    pub async fn play_track(&self, track_id: &str) -> Result<()> {
        let track_id = track_id.to_string();
        self.request(|reply| SessionCommand::PlayTrack { track_id, reply })
            .await?
    }

    pub async fn play(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Play { reply }).await?
    }

    pub async fn toggle_play(&self) -> Result<()> {
        self.request(|reply| SessionCommand::TogglePlay { reply })
            .await?
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Pause { reply }).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Stop { reply }).await
    }

    pub async fn seek(&self, seconds: f64) -> Result<()> {
        self.request(|reply| SessionCommand::Seek { seconds, reply })
            .await
    }

    pub async fn set_volume(&self, level: f64) -> Result<()> {
        self.request(|reply| SessionCommand::SetVolume { level, reply })
            .await
    }

    /// Enter a room by hand; true if the current room changed
    pub async fn select_room(&self, room_id: &str) -> Result<bool> {
        let room_id = room_id.to_string();
        self.request(|reply| SessionCommand::SelectRoom { room_id, reply })
            .await?
    }

    pub async fn accept_offer(&self) -> Result<()> {
        self.request(|reply| SessionCommand::AcceptOffer { reply })
            .await?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Shutdown { reply })
            .await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<GuideEvent> {
        self.event_bus.subscribe()
    }

    pub fn subscribe_playback(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.playback.clone()
    }

    pub fn subscribe_room(&self) -> watch::Receiver<Option<Arc<Room>>> {
        self.room.clone()
    }

    pub fn subscribe_position(&self) -> watch::Receiver<Option<Position>> {
        self.position.clone()
    }

    /// Latest published playback snapshot
    pub fn playback_snapshot(&self) -> PlaybackSnapshot {
        self.playback.borrow().clone()
    }

    pub fn current_room(&self) -> Option<Arc<Room>> {
        self.room.borrow().clone()
    }
}
