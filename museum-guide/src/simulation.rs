//! Scripted position source and simulated audio engine
//!
//! Stand-ins for the platform collaborators, used by the `replay` command
//! and by tests. Both hand out a cloneable probe for inspecting and steering
//! them after they have been moved into a tracker or controller.
//!
//! `ScriptedPositionSource` spawns its playback on the current tokio
//! runtime, so `request_continuous_updates` must be called from within one.

use crate::playback::{AudioEngine, EngineError, EngineEvent};
use crate::position::RawFix;
use crate::tracker::{
    FixResult, PositionSource, SourceError, Subscription, SubscriptionHandle, WatchOptions,
};
use futures::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

// ========================================
// Position source
// ========================================

/// One step of a position script
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Fix(RawFix),
    Error(SourceError),
    Wait(Duration),
}

#[derive(Default)]
struct SourceProbeState {
    requests: Vec<WatchOptions>,
    cancelled: Vec<SubscriptionHandle>,
    live: Option<(SubscriptionHandle, mpsc::UnboundedSender<FixResult>)>,
}

/// Inspection and injection handle for a `ScriptedPositionSource`
#[derive(Clone, Default)]
pub struct SourceProbe {
    state: Arc<Mutex<SourceProbeState>>,
}

impl SourceProbe {
    fn lock(&self) -> MutexGuard<'_, SourceProbeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Options of every continuous-update request so far
    pub fn requests(&self) -> Vec<WatchOptions> {
        self.lock().requests.clone()
    }

    pub fn cancelled(&self) -> Vec<SubscriptionHandle> {
        self.lock().cancelled.clone()
    }

    /// True while a subscription is open
    pub fn is_live(&self) -> bool {
        self.lock().live.is_some()
    }

    /// Deliver a fix on the live subscription; false if there is none
    pub fn push(&self, fix: RawFix) -> bool {
        self.send(Ok(fix))
    }

    /// Deliver an error on the live subscription; false if there is none
    pub fn push_error(&self, error: SourceError) -> bool {
        self.send(Err(error))
    }

    fn send(&self, item: FixResult) -> bool {
        match &self.lock().live {
            Some((_, tx)) => tx.send(item).is_ok(),
            None => false,
        }
    }
}

/// Position source that replays scripted fixes, errors and pauses
pub struct ScriptedPositionSource {
    supported: bool,
    refusal: Option<SourceError>,
    scripts: VecDeque<Vec<ScriptStep>>,
    close_after_script: bool,
    probe: SourceProbe,
}

impl ScriptedPositionSource {
    /// Source that plays `script` on every request
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            supported: true,
            refusal: None,
            scripts: VecDeque::from([script]),
            close_after_script: false,
            probe: SourceProbe::default(),
        }
    }

    /// Source that replays nothing; fixes are injected through the probe
    pub fn manual() -> Self {
        Self::new(Vec::new())
    }

    /// Platform without any position capability
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::manual()
        }
    }

    /// Refuse every continuous-update request with `error`
    pub fn refusing(error: SourceError) -> Self {
        Self {
            refusal: Some(error),
            ..Self::manual()
        }
    }

    /// Play `script` for the next request; the last script repeats
    pub fn then_script(mut self, script: Vec<ScriptStep>) -> Self {
        self.scripts.push_back(script);
        self
    }

    /// Close the stream after the script instead of staying open
    pub fn close_when_done(mut self) -> Self {
        self.close_after_script = true;
        self
    }

    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }

    fn next_script(&mut self) -> Vec<ScriptStep> {
        if self.scripts.len() > 1 {
            self.scripts.pop_front().unwrap_or_default()
        } else {
            self.scripts.front().cloned().unwrap_or_default()
        }
    }
}

impl PositionSource for ScriptedPositionSource {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn request_continuous_updates(
        &mut self,
        options: &WatchOptions,
    ) -> Result<Subscription, SourceError> {
        self.probe.lock().requests.push(options.clone());
        if let Some(error) = &self.refusal {
            return Err(error.clone());
        }

        let handle = SubscriptionHandle::new();
        let (tx, fixes) = mpsc::unbounded_channel();
        self.probe.lock().live = Some((handle, tx.clone()));

        let script = self.next_script();
        let close = self.close_after_script;
        let probe = self.probe.clone();
        tokio::spawn(async move {
            for step in script {
                let item = match step {
                    ScriptStep::Wait(duration) => {
                        tokio::time::sleep(duration).await;
                        continue;
                    }
                    ScriptStep::Fix(fix) => Ok(fix),
                    ScriptStep::Error(error) => Err(error),
                };
                if tx.send(item).is_err() {
                    return;
                }
            }
            if close {
                let mut state = probe.lock();
                if state.live.as_ref().is_some_and(|(live, _)| *live == handle) {
                    state.live = None;
                }
                debug!(%handle, "Position script finished; closing stream");
            } else {
                tx.closed().await;
            }
        });

        Ok(Subscription { handle, fixes })
    }

    fn cancel(&mut self, handle: SubscriptionHandle) {
        let mut state = self.probe.lock();
        state.cancelled.push(handle);
        if state.live.as_ref().is_some_and(|(live, _)| *live == handle) {
            state.live = None;
        }
    }
}

// ========================================
// Audio engine
// ========================================

/// Command received by the simulated engine, for assertions
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    SetSource(String),
    Play,
    Pause,
    SetCurrentTime(f64),
    SetVolume(f64),
}

struct EngineState {
    source: Option<String>,
    playing: bool,
    current_time: f64,
    /// NaN until known, like a media element
    duration: f64,
    volume: f64,
    play_results: VecDeque<Result<(), EngineError>>,
    play_delay: Duration,
    /// Bumped by pause and source changes; aborts pending play requests
    generation: u64,
    commands: Vec<EngineCommand>,
}

/// Inspection and steering handle for a `SimulatedAudioEngine`
#[derive(Clone)]
pub struct EngineProbe {
    state: Arc<Mutex<EngineState>>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineProbe {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn commands(&self) -> Vec<EngineCommand> {
        self.lock().commands.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn current_time(&self) -> f64 {
        self.lock().current_time
    }

    pub fn volume(&self) -> f64 {
        self.lock().volume
    }

    /// Reject the next play request with `error`
    pub fn fail_next_play(&self, error: EngineError) {
        self.lock().play_results.push_back(Err(error));
    }

    /// Delay before play requests resolve
    pub fn set_play_delay(&self, delay: Duration) {
        self.lock().play_delay = delay;
    }

    /// Report a known duration for the current source
    pub fn set_duration(&self, seconds: f64) {
        self.lock().duration = seconds;
    }

    /// Emit an arbitrary event, well-formed or not
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// Advance the play head while playing, ending the track at its duration
    pub fn advance(&self, seconds: f64) {
        let mut state = self.lock();
        if !state.playing {
            return;
        }
        state.current_time += seconds;
        let ended = state.duration.is_finite() && state.current_time >= state.duration;
        if ended {
            state.current_time = state.duration;
        }
        let _ = self.events.send(EngineEvent::TimeUpdate {
            current_time: state.current_time,
            duration: state.duration,
        });
        if ended {
            state.playing = false;
            state.current_time = 0.0;
            let _ = self.events.send(EngineEvent::Pause);
            let _ = self.events.send(EngineEvent::Ended);
        }
    }
}

/// Audio engine that keeps time in memory and emits media-element style events
pub struct SimulatedAudioEngine {
    source: Option<String>,
    probe: EngineProbe,
}

impl SimulatedAudioEngine {
    /// Create the engine, its probe and the receiver for its events
    pub fn new() -> (Self, EngineProbe, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let probe = EngineProbe {
            state: Arc::new(Mutex::new(EngineState {
                source: None,
                playing: false,
                current_time: 0.0,
                duration: f64::NAN,
                volume: 1.0,
                play_results: VecDeque::new(),
                play_delay: Duration::ZERO,
                generation: 0,
                commands: Vec::new(),
            })),
            events,
        };
        let engine = Self {
            source: None,
            probe: probe.clone(),
        };
        (engine, probe, rx)
    }
}

impl AudioEngine for SimulatedAudioEngine {
    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn set_source(&mut self, url: &str) {
        self.source = Some(url.to_string());
        let mut state = self.probe.lock();
        state.commands.push(EngineCommand::SetSource(url.to_string()));
        state.source = Some(url.to_string());
        state.generation += 1;
        state.playing = false;
        state.current_time = 0.0;
        state.duration = f64::NAN;
    }

    fn play(&mut self) -> BoxFuture<'static, Result<(), EngineError>> {
        let (generation, verdict, delay) = {
            let mut state = self.probe.lock();
            state.commands.push(EngineCommand::Play);
            let verdict = if state.source.is_none() {
                Err(EngineError::Decode("no source set".to_string()))
            } else {
                state.play_results.pop_front().unwrap_or(Ok(()))
            };
            (state.generation, verdict, state.play_delay)
        };

        let probe = self.probe.clone();
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut state = probe.lock();
            if state.generation != generation {
                return Err(EngineError::Aborted);
            }
            verdict?;
            if !state.playing {
                state.playing = true;
                let _ = probe.events.send(EngineEvent::Play);
            }
            Ok(())
        }
        .boxed()
    }

    fn pause(&mut self) {
        let mut state = self.probe.lock();
        state.commands.push(EngineCommand::Pause);
        state.generation += 1;
        if state.playing {
            state.playing = false;
            let _ = self.probe.events.send(EngineEvent::Pause);
        }
    }

    fn set_current_time(&mut self, seconds: f64) {
        let mut state = self.probe.lock();
        state.commands.push(EngineCommand::SetCurrentTime(seconds));
        if !seconds.is_finite() {
            return;
        }
        let mut time = seconds.max(0.0);
        if state.duration.is_finite() {
            time = time.min(state.duration);
        }
        state.current_time = time;
        let _ = self.probe.events.send(EngineEvent::TimeUpdate {
            current_time: time,
            duration: state.duration,
        });
    }

    fn set_volume(&mut self, level: f64) {
        let mut state = self.probe.lock();
        state.commands.push(EngineCommand::SetVolume(level));
        state.volume = level;
        let _ = self.probe.events.send(EngineEvent::VolumeChange { volume: level });
    }
}
