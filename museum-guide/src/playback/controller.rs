//! Playback controller
//!
//! Single authority over one audio engine. Commands go to the engine; the
//! engine's events are reconciled back into the snapshot. Every change is
//! published as one complete snapshot.
//!
//! State machine:
//! - `Idle`: no track loaded
//! - `Loaded`: track set, not playing (after load, stop or end of track)
//! - `Playing`: engine confirmed playback
//! - `Paused`: engine confirmed a pause while playing
//!
//! `is_playing` only ever follows the engine's `Play`/`Pause`/`Ended`
//! events. A stale `play()` resolution arriving after a pause therefore
//! cannot un-pause the reported state.

use super::engine::{AudioEngine, EngineError, EngineEvent};
use super::snapshot::{clamp_volume, PlaybackSnapshot};
use crate::error::{Error, Result};
use crate::observable::Observable;
use futures::future::{self, BoxFuture, FutureExt};
use museum_common::catalog::{Catalog, Track};
use museum_common::events::PlayerStatus;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct PlaybackController {
    engine: Box<dyn AudioEngine>,
    tracks: Vec<Arc<Track>>,
    state: Observable<PlaybackSnapshot>,
}

impl PlaybackController {
    /// Create a controller and push the initial volume to the engine
    pub fn new(mut engine: Box<dyn AudioEngine>, catalog: &Catalog, initial_volume: f64) -> Self {
        let snapshot = PlaybackSnapshot::new(initial_volume);
        engine.set_volume(snapshot.volume);
        Self {
            engine,
            tracks: catalog.tracks().to_vec(),
            state: Observable::new(snapshot),
        }
    }

    pub fn tracks(&self) -> &[Arc<Track>] {
        &self.tracks
    }

    pub fn track(&self, id: &str) -> Option<&Arc<Track>> {
        self.tracks.iter().find(|track| track.id == id)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.state.get()
    }

    pub fn status(&self) -> PlayerStatus {
        self.state.with(|s| s.status)
    }

    /// Last-value-cached snapshot stream
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.state.subscribe()
    }

    /// Number of snapshots published since construction
    pub fn snapshot_version(&self) -> u64 {
        self.state.version()
    }

    /// Apply one change to a copy of the current snapshot and publish it
    fn update(&mut self, apply: impl FnOnce(&mut PlaybackSnapshot)) {
        let mut next = self.state.get();
        apply(&mut next);
        self.state.publish(next);
    }

    /// Load a track, unless its source is already loaded
    ///
    /// Returns true if the engine source changed. Reloading the current
    /// source is a no-op so that a redundant load does not restart the
    /// narration from zero.
    pub fn load_track(&mut self, track: Arc<Track>) -> bool {
        if self.engine.source() == Some(track.url.as_str()) {
            debug!(track_id = %track.id, "Track already loaded");
            return false;
        }

        info!(track_id = %track.id, url = %track.url, "Loading track '{}'", track.title);
        self.engine.set_source(&track.url);
        let duration = track.duration.unwrap_or(0.0);
        self.update(|s| {
            s.status = PlayerStatus::Loaded;
            s.is_playing = false;
            s.current_track = Some(track);
            s.current_time = 0.0;
            s.duration = duration;
        });
        true
    }

    /// Ask the engine to play the loaded track
    ///
    /// The returned future does not borrow the controller: other commands
    /// and engine events can be processed while it is pending. It resolves
    /// with the engine's verdict; `is_playing` flips when the engine's
    /// `Play` event arrives, not when this future resolves. A request the
    /// engine aborted because of a later pause or load resolves `Ok`.
    ///
    /// # Errors
    /// `Error::Playback` if no track is loaded or the engine rejects playback.
    pub fn play(&mut self) -> BoxFuture<'static, Result<()>> {
        let Some(track_id) = self.state.with(|s| s.track_id().map(str::to_string)) else {
            warn!("Play requested with no track loaded");
            return future::ready(Err(Error::Playback("no track loaded".to_string()))).boxed();
        };

        info!(track_id = %track_id, "Play command received");
        let request = self.engine.play();
        async move {
            match request.await {
                Ok(()) => Ok(()),
                // Superseded by a later pause or load, not a failure
                Err(EngineError::Aborted) => {
                    debug!(track_id = %track_id, "Play request aborted");
                    Ok(())
                }
                Err(e) => {
                    warn!(track_id = %track_id, "Audio engine rejected playback: {}", e);
                    Err(Error::Playback(format!("cannot play track {}: {}", track_id, e)))
                }
            }
        }
        .boxed()
    }

    /// Pause playback; no-op when nothing is loaded
    ///
    /// Forwarded to the engine even before a pending `play()` is confirmed,
    /// so that the engine can abort the pending request.
    pub fn pause(&mut self) {
        if self.status() == PlayerStatus::Idle {
            debug!("Pause ignored: no track loaded");
            return;
        }
        info!("Pause command received");
        self.engine.pause();
    }

    /// Pause and rewind, keeping the loaded track
    pub fn stop(&mut self) {
        if self.status() == PlayerStatus::Idle {
            debug!("Stop ignored: no track loaded");
            return;
        }
        info!("Stop command received");
        self.engine.pause();
        self.engine.set_current_time(0.0);
        self.update(|s| {
            s.status = PlayerStatus::Loaded;
            s.is_playing = false;
            s.current_time = 0.0;
        });
    }

    /// Move the play head; range checking is left to the engine
    pub fn seek(&mut self, seconds: f64) {
        if self.status() == PlayerStatus::Idle {
            debug!(seconds, "Seek ignored: no track loaded");
            return;
        }
        debug!(seconds, "Seek");
        self.engine.set_current_time(seconds);
    }

    /// Set output volume, clamped to 0.0-1.0
    pub fn set_volume(&mut self, level: f64) {
        let volume = clamp_volume(level);
        debug!(requested = level, volume, "Set volume");
        self.engine.set_volume(volume);
        self.update(|s| s.volume = volume);
    }

    /// Pause when playing, play otherwise
    pub fn toggle_play(&mut self) -> BoxFuture<'static, Result<()>> {
        if self.state.with(|s| s.is_playing) {
            self.pause();
            future::ready(Ok(())).boxed()
        } else {
            self.play()
        }
    }

    /// Look up a track, load it and play it
    ///
    /// # Errors
    /// `Error::TrackNotFound` (state untouched) or any error from `play()`.
    pub fn play_track_by_id(&mut self, track_id: &str) -> BoxFuture<'static, Result<()>> {
        let Some(track) = self.track(track_id).cloned() else {
            warn!(track_id, "Requested track not in catalog");
            return future::ready(Err(Error::TrackNotFound(track_id.to_string()))).boxed();
        };
        self.load_track(track);
        self.play()
    }

    /// Reconcile an engine event into the snapshot
    ///
    /// Malformed payloads and events that make no sense without a loaded
    /// track are logged and dropped. Returns true if a snapshot was published.
    pub fn handle_engine_event(&mut self, event: EngineEvent) -> bool {
        if self.status() == PlayerStatus::Idle && !matches!(event, EngineEvent::VolumeChange { .. }) {
            debug!(?event, "Engine event ignored: no track loaded");
            return false;
        }

        match event {
            EngineEvent::TimeUpdate {
                current_time,
                duration,
            } => {
                if !current_time.is_finite() || current_time < 0.0 {
                    warn!(current_time, "Dropping malformed time update");
                    return false;
                }
                self.update(|s| {
                    // NaN/zero duration means the engine does not know it yet
                    if duration.is_finite() && duration > 0.0 {
                        s.duration = duration;
                    }
                    s.current_time = if s.duration > 0.0 {
                        current_time.min(s.duration)
                    } else {
                        current_time
                    };
                });
            }
            EngineEvent::Ended => {
                info!("Track ended");
                self.update(|s| {
                    s.status = PlayerStatus::Loaded;
                    s.is_playing = false;
                    s.current_time = 0.0;
                });
            }
            EngineEvent::Play => {
                self.update(|s| {
                    s.status = PlayerStatus::Playing;
                    s.is_playing = true;
                });
            }
            EngineEvent::Pause => {
                self.update(|s| {
                    if s.status == PlayerStatus::Playing {
                        s.status = PlayerStatus::Paused;
                    }
                    s.is_playing = false;
                });
            }
            EngineEvent::VolumeChange { volume } => {
                if !volume.is_finite() {
                    warn!(volume, "Dropping malformed volume change");
                    return false;
                }
                self.update(|s| s.volume = clamp_volume(volume));
            }
        }
        true
    }
}
