//! Integration tests for PlaybackController against the simulated engine

mod helpers;

use helpers::sample_catalog;
use museum_common::events::PlayerStatus;
use museum_guide::playback::PlaybackController;
use museum_guide::simulation::{EngineCommand, EngineProbe, SimulatedAudioEngine};
use museum_guide::{EngineError, EngineEvent, Error};
use std::time::Duration;
use tokio::sync::mpsc;

struct Fixture {
    controller: PlaybackController,
    probe: EngineProbe,
    events: mpsc::UnboundedReceiver<EngineEvent>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_volume(1.0)
    }

    fn with_volume(volume: f64) -> Self {
        let (engine, probe, events) = SimulatedAudioEngine::new();
        let controller = PlaybackController::new(Box::new(engine), &sample_catalog(), volume);
        Self {
            controller,
            probe,
            events,
        }
    }

    /// Feed every event the engine has emitted so far into the controller
    fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.controller.handle_engine_event(event);
        }
    }

    fn load(&mut self, track_id: &str) {
        let track = self.controller.track(track_id).cloned().expect("track in catalog");
        self.controller.load_track(track);
        self.pump();
    }

    async fn play(&mut self, track_id: &str) {
        self.controller
            .play_track_by_id(track_id)
            .await
            .expect("engine accepts playback");
        self.pump();
    }
}

#[tokio::test]
async fn test_play_when_idle_fails() {
    let mut fx = Fixture::new();

    let err = fx.controller.play().await.unwrap_err();

    assert!(matches!(err, Error::Playback(_)));
    assert_eq!(fx.controller.status(), PlayerStatus::Idle);
    assert!(!fx.probe.commands().contains(&EngineCommand::Play));
}

#[test]
fn test_initial_snapshot_and_volume() {
    let fx = Fixture::with_volume(0.5);
    let snap = fx.controller.snapshot();

    assert_eq!(snap.status, PlayerStatus::Idle);
    assert!(!snap.is_playing);
    assert!(snap.current_track.is_none());
    assert_eq!(snap.current_time, 0.0);
    assert_eq!(snap.duration, 0.0);
    assert_eq!(snap.volume, 0.5);
    assert_eq!(fx.probe.commands(), vec![EngineCommand::SetVolume(0.5)]);
}

#[test]
fn test_volume_is_clamped() {
    let mut fx = Fixture::new();

    fx.controller.set_volume(-1.0);
    assert_eq!(fx.controller.snapshot().volume, 0.0);
    assert_eq!(fx.probe.volume(), 0.0);

    fx.controller.set_volume(5.0);
    assert_eq!(fx.controller.snapshot().volume, 1.0);
    assert_eq!(fx.probe.volume(), 1.0);

    fx.controller.set_volume(f64::NAN);
    assert_eq!(fx.controller.snapshot().volume, 0.0);
}

#[test]
fn test_load_track_sets_metadata() {
    let mut fx = Fixture::new();
    fx.load("t-a");

    let snap = fx.controller.snapshot();
    assert_eq!(snap.status, PlayerStatus::Loaded);
    assert_eq!(snap.track_id(), Some("t-a"));
    assert_eq!(snap.duration, 120.0);
    assert_eq!(snap.current_time, 0.0);
    assert!(!snap.is_playing);
    assert!(fx
        .probe
        .commands()
        .contains(&EngineCommand::SetSource("audio/a.mp3".to_string())));
}

#[test]
fn test_redundant_load_keeps_position() {
    let mut fx = Fixture::new();
    fx.load("t-a");
    fx.controller.handle_engine_event(EngineEvent::TimeUpdate {
        current_time: 42.0,
        duration: 120.0,
    });
    let version = fx.controller.snapshot_version();

    let track = fx.controller.track("t-a").cloned().unwrap();
    assert!(!fx.controller.load_track(track));

    assert_eq!(fx.controller.snapshot().current_time, 42.0);
    assert_eq!(fx.controller.snapshot_version(), version);
}

#[tokio::test]
async fn test_unknown_track_leaves_state_untouched() {
    let mut fx = Fixture::new();
    fx.load("t-a");
    let before = fx.controller.snapshot();
    let version = fx.controller.snapshot_version();

    let err = fx
        .controller
        .play_track_by_id("does-not-exist")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TrackNotFound(ref id) if id == "does-not-exist"));
    assert_eq!(fx.controller.snapshot(), before);
    assert_eq!(fx.controller.snapshot_version(), version);
}

#[tokio::test]
async fn test_play_confirmed_by_engine_event() {
    let mut fx = Fixture::new();
    fx.load("t-a");

    fx.controller.play().await.unwrap();
    // Resolution alone does not flip the flag
    assert!(!fx.controller.snapshot().is_playing);

    fx.pump();
    let snap = fx.controller.snapshot();
    assert!(snap.is_playing);
    assert_eq!(snap.status, PlayerStatus::Playing);
}

#[tokio::test]
async fn test_stop_after_playing() {
    let mut fx = Fixture::new();
    fx.play("t-a").await;
    fx.probe.advance(30.0);
    fx.pump();
    assert_eq!(fx.controller.snapshot().current_time, 30.0);
    let version = fx.controller.snapshot_version();

    fx.controller.stop();

    let snap = fx.controller.snapshot();
    assert!(!snap.is_playing);
    assert_eq!(snap.current_time, 0.0);
    assert_eq!(snap.track_id(), Some("t-a"));
    assert_eq!(snap.status, PlayerStatus::Loaded);
    assert_eq!(fx.controller.snapshot_version(), version + 1);

    // The engine's own pause and rewind confirmations change nothing
    fx.pump();
    let snap = fx.controller.snapshot();
    assert_eq!(snap.status, PlayerStatus::Loaded);
    assert_eq!(snap.current_time, 0.0);
    assert!(!fx.probe.is_playing());
}

#[test]
fn test_stop_when_idle_is_noop() {
    let mut fx = Fixture::new();
    let version = fx.controller.snapshot_version();

    fx.controller.stop();

    assert_eq!(fx.controller.status(), PlayerStatus::Idle);
    assert_eq!(fx.controller.snapshot_version(), version);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let mut fx = Fixture::new();
    fx.play("t-a").await;

    fx.controller.pause();
    fx.pump();
    assert_eq!(fx.controller.status(), PlayerStatus::Paused);
    assert!(!fx.controller.snapshot().is_playing);

    fx.controller.play().await.unwrap();
    fx.pump();
    assert_eq!(fx.controller.status(), PlayerStatus::Playing);
}

#[tokio::test]
async fn test_toggle_play() {
    let mut fx = Fixture::new();
    fx.load("t-b");

    fx.controller.toggle_play().await.unwrap();
    fx.pump();
    assert!(fx.controller.snapshot().is_playing);

    fx.controller.toggle_play().await.unwrap();
    fx.pump();
    assert!(!fx.controller.snapshot().is_playing);
    assert_eq!(fx.controller.status(), PlayerStatus::Paused);
}

#[tokio::test(start_paused = true)]
async fn test_pause_before_play_confirmation_wins() {
    let mut fx = Fixture::new();
    fx.load("t-a");
    fx.probe.set_play_delay(Duration::from_millis(500));

    let pending = fx.controller.play();
    fx.controller.pause();
    pending.await.expect("aborted play is not a failure");
    fx.pump();

    assert!(!fx.controller.snapshot().is_playing);
    assert!(!fx.probe.is_playing());
}

#[tokio::test]
async fn test_latest_engine_state_wins() {
    let mut fx = Fixture::new();
    fx.load("t-a");

    fx.probe.emit(EngineEvent::Play);
    fx.probe.emit(EngineEvent::Pause);
    fx.pump();

    assert!(!fx.controller.snapshot().is_playing);
    assert_eq!(fx.controller.status(), PlayerStatus::Paused);
}

#[tokio::test]
async fn test_engine_rejection_is_reported() {
    let mut fx = Fixture::new();
    fx.load("t-a");
    fx.probe
        .fail_next_play(EngineError::NotAllowed("autoplay blocked".to_string()));

    let err = fx.controller.play().await.unwrap_err();
    fx.pump();

    assert!(matches!(err, Error::Playback(ref msg) if msg.contains("autoplay blocked")));
    assert!(err.is_retryable());
    assert_eq!(fx.controller.status(), PlayerStatus::Loaded);
    assert!(!fx.controller.snapshot().is_playing);

    // No automatic retry: one play command reached the engine
    let plays = fx
        .probe
        .commands()
        .into_iter()
        .filter(|c| *c == EngineCommand::Play)
        .count();
    assert_eq!(plays, 1);
}

#[test]
fn test_malformed_events_are_dropped() {
    let mut fx = Fixture::new();
    fx.load("t-a");
    let before = fx.controller.snapshot();

    assert!(!fx.controller.handle_engine_event(EngineEvent::TimeUpdate {
        current_time: f64::NAN,
        duration: 120.0,
    }));
    assert!(!fx.controller.handle_engine_event(EngineEvent::TimeUpdate {
        current_time: -3.0,
        duration: 120.0,
    }));
    assert!(!fx
        .controller
        .handle_engine_event(EngineEvent::VolumeChange { volume: f64::INFINITY }));

    assert_eq!(fx.controller.snapshot(), before);
}

#[test]
fn test_events_ignored_while_idle() {
    let mut fx = Fixture::new();

    assert!(!fx.controller.handle_engine_event(EngineEvent::Play));
    assert!(!fx.controller.handle_engine_event(EngineEvent::Ended));

    assert_eq!(fx.controller.status(), PlayerStatus::Idle);
    assert!(!fx.controller.snapshot().is_playing);
}

#[test]
fn test_time_never_exceeds_known_duration() {
    let mut fx = Fixture::new();
    fx.load("t-a");

    fx.controller.handle_engine_event(EngineEvent::TimeUpdate {
        current_time: 150.0,
        duration: 120.0,
    });

    let snap = fx.controller.snapshot();
    assert_eq!(snap.current_time, 120.0);
    assert_eq!(snap.duration, 120.0);
}

#[test]
fn test_unknown_duration_keeps_previous_value() {
    let mut fx = Fixture::new();
    fx.load("t-b");

    fx.controller.handle_engine_event(EngineEvent::TimeUpdate {
        current_time: 12.0,
        duration: f64::NAN,
    });
    assert_eq!(fx.controller.snapshot().duration, 0.0);
    assert_eq!(fx.controller.snapshot().current_time, 12.0);

    fx.controller.handle_engine_event(EngineEvent::TimeUpdate {
        current_time: 13.0,
        duration: 300.0,
    });
    assert_eq!(fx.controller.snapshot().duration, 300.0);
}

#[tokio::test]
async fn test_track_end_returns_to_loaded() {
    let mut fx = Fixture::new();
    fx.play("t-b").await;
    fx.probe.set_duration(10.0);

    fx.probe.advance(11.0);
    fx.pump();

    let snap = fx.controller.snapshot();
    assert_eq!(snap.status, PlayerStatus::Loaded);
    assert!(!snap.is_playing);
    assert_eq!(snap.current_time, 0.0);
    assert_eq!(snap.track_id(), Some("t-b"));
}

#[test]
fn test_seek_ignored_when_idle() {
    let mut fx = Fixture::new();

    fx.controller.seek(30.0);

    assert!(!fx
        .probe
        .commands()
        .iter()
        .any(|c| matches!(c, EngineCommand::SetCurrentTime(_))));
}

#[test]
fn test_seek_forwarded_without_validation() {
    let mut fx = Fixture::new();
    fx.load("t-a");

    fx.controller.seek(-5.0);
    fx.controller.seek(60.0);
    fx.pump();

    let commands = fx.probe.commands();
    assert!(commands.contains(&EngineCommand::SetCurrentTime(-5.0)));
    assert!(commands.contains(&EngineCommand::SetCurrentTime(60.0)));
    assert_eq!(fx.controller.snapshot().current_time, 60.0);
}

#[test]
fn test_subscriber_sees_latest_snapshot_immediately() {
    let mut fx = Fixture::new();
    fx.load("t-a");
    fx.controller.set_volume(0.25);

    let rx = fx.controller.subscribe();
    let snap = rx.borrow().clone();

    assert_eq!(snap.track_id(), Some("t-a"));
    assert_eq!(snap.volume, 0.25);
}
