//! Integration tests for PositionTracker
//!
//! Covers acquisition (first fix, timeout, unsupported, refused), sample
//! validation, hysteresis through the tracker and stop semantics.

mod helpers;

use helpers::{fix_north, sample_catalog};
use museum_guide::simulation::{ScriptStep, ScriptedPositionSource};
use museum_guide::{Error, PositionTracker, RawFix, RoomResolver, SourceError, WatchOptions};
use std::time::Duration;

fn tracker_with(source: ScriptedPositionSource) -> PositionTracker {
    let catalog = sample_catalog();
    PositionTracker::new(
        Box::new(source),
        RoomResolver::from_catalog(&catalog),
        WatchOptions::default(),
    )
}

#[tokio::test]
async fn test_start_tracking_resolves_on_first_fix() {
    let source = ScriptedPositionSource::new(vec![ScriptStep::Fix(fix_north(5.0, 4.0))]);
    let probe = source.probe();
    let mut tracker = tracker_with(source);

    let change = tracker
        .start_tracking()
        .await
        .expect("tracking starts")
        .expect("first fix enters room A");

    assert_eq!(change.current.id, "A");
    assert!(change.previous.is_none());
    assert!(tracker.is_tracking());
    assert!(tracker.current_position().is_some());
    assert_eq!(probe.requests(), vec![WatchOptions::default()]);
}

#[test]
fn test_requested_options_follow_defaults() {
    let options = WatchOptions::default();
    assert!(options.high_accuracy);
    assert_eq!(options.timeout, Duration::from_secs(5));
    assert_eq!(options.max_staleness, Duration::ZERO);
}

#[tokio::test]
async fn test_start_tracking_twice_is_noop() {
    let source = ScriptedPositionSource::new(vec![ScriptStep::Fix(fix_north(5.0, 4.0))]);
    let probe = source.probe();
    let mut tracker = tracker_with(source);

    tracker.start_tracking().await.unwrap();
    let second = tracker.start_tracking().await.unwrap();

    assert!(second.is_none());
    assert_eq!(probe.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_tracking_times_out() {
    let source = ScriptedPositionSource::manual();
    let probe = source.probe();
    let mut tracker = tracker_with(source);

    let err = tracker.start_tracking().await.unwrap_err();

    assert!(
        matches!(err, Error::Acquisition(SourceError::Timeout(t)) if t == Duration::from_secs(5)),
        "unexpected error: {:?}",
        err
    );
    assert!(err.is_retryable());
    assert!(!tracker.is_tracking());
    assert_eq!(probe.cancelled().len(), 1);
    assert!(!probe.is_live());
}

#[tokio::test]
async fn test_start_tracking_unsupported() {
    let source = ScriptedPositionSource::unsupported();
    let probe = source.probe();
    let mut tracker = tracker_with(source);

    let err = tracker.start_tracking().await.unwrap_err();

    assert!(matches!(err, Error::Unsupported(_)));
    assert!(!err.is_retryable());
    assert!(probe.requests().is_empty());
}

#[tokio::test]
async fn test_start_tracking_permission_denied() {
    let denied = SourceError::PermissionDenied("user declined".to_string());
    let mut tracker = tracker_with(ScriptedPositionSource::refusing(denied.clone()));

    let err = tracker.start_tracking().await.unwrap_err();

    assert!(matches!(err, Error::Acquisition(ref e) if *e == denied));
    assert!(!tracker.is_tracking());
}

#[tokio::test]
async fn test_source_error_before_first_fix_fails_acquisition() {
    let source = ScriptedPositionSource::new(vec![
        ScriptStep::Error(SourceError::Unavailable("no satellites".to_string())),
        ScriptStep::Fix(fix_north(5.0, 4.0)),
    ]);
    let probe = source.probe();
    let mut tracker = tracker_with(source);

    let err = tracker.start_tracking().await.unwrap_err();

    assert!(matches!(err, Error::Acquisition(SourceError::Unavailable(_))));
    assert_eq!(probe.cancelled().len(), 1);
    assert!(tracker.resolver().current_room().is_none());
}

#[tokio::test]
async fn test_stream_closed_before_first_fix_fails_acquisition() {
    let mut tracker = tracker_with(ScriptedPositionSource::manual().close_when_done());

    let err = tracker.start_tracking().await.unwrap_err();

    assert!(matches!(err, Error::Acquisition(SourceError::Unavailable(_))));
    assert!(!tracker.is_tracking());
    assert!(!tracker.is_acquiring());
}

#[tokio::test]
async fn test_retry_after_failed_acquisition() {
    let source = ScriptedPositionSource::new(vec![ScriptStep::Error(SourceError::Unavailable(
        "warming up".to_string(),
    ))])
    .then_script(vec![ScriptStep::Fix(fix_north(5.0, 4.0))]);
    let probe = source.probe();
    let mut tracker = tracker_with(source);

    assert!(tracker.start_tracking().await.is_err());
    let change = tracker.start_tracking().await.unwrap();

    assert_eq!(change.map(|c| c.current.id.clone()), Some("A".to_string()));
    assert_eq!(probe.requests().len(), 2);
}

#[tokio::test]
async fn test_errors_after_first_fix_are_dropped() {
    let source = ScriptedPositionSource::new(vec![
        ScriptStep::Fix(fix_north(5.0, 4.0)),
        ScriptStep::Error(SourceError::Unavailable("tunnel".to_string())),
        ScriptStep::Fix(fix_north(101.0, 4.0)),
    ]);
    let mut tracker = tracker_with(source);
    tracker.start_tracking().await.unwrap();

    let item = tracker.next_fix().await;
    assert!(tracker.handle_fix(item).unwrap().is_none());
    assert!(tracker.is_tracking());

    let item = tracker.next_fix().await;
    let outcome = tracker.handle_fix(item).unwrap().expect("valid sample");
    let change = outcome.room_change.expect("moved to B");
    assert_eq!(change.previous.map(|r| r.id.clone()), Some("A".to_string()));
    assert_eq!(change.current.id, "B");
    assert!(!outcome.first_fix);
}

#[tokio::test]
async fn test_invalid_samples_are_dropped() {
    let source = ScriptedPositionSource::new(vec![
        ScriptStep::Fix(RawFix::new(f64::NAN, 7.0, 5.0, 0)),
        ScriptStep::Fix(RawFix::new(95.0, 7.0, 5.0, 0)),
        ScriptStep::Fix(RawFix::new(45.0, 7.0, -1.0, 0)),
        ScriptStep::Fix(fix_north(5.0, 4.0)),
    ]);
    let mut tracker = tracker_with(source);

    let change = tracker.start_tracking().await.unwrap();

    assert_eq!(change.map(|c| c.current.id.clone()), Some("A".to_string()));
    let position = tracker.current_position().unwrap();
    assert_eq!(position.accuracy, 4.0);
}

#[tokio::test]
async fn test_inaccurate_samples_rejected_when_limit_set() {
    let source = ScriptedPositionSource::new(vec![
        ScriptStep::Fix(fix_north(5.0, 50.0)),
        ScriptStep::Fix(fix_north(102.0, 5.0)),
    ]);
    let mut tracker = tracker_with(source).with_max_accuracy(Some(20.0));

    let change = tracker.start_tracking().await.unwrap();

    assert_eq!(change.map(|c| c.current.id.clone()), Some("B".to_string()));
}

#[tokio::test]
async fn test_leaving_all_rooms_keeps_current_room() {
    let source = ScriptedPositionSource::new(vec![ScriptStep::Fix(fix_north(5.0, 4.0))]);
    let probe = source.probe();
    let mut tracker = tracker_with(source);
    tracker.start_tracking().await.unwrap();

    assert!(probe.push(fix_north(50.0, 4.0)));
    let item = tracker.next_fix().await;
    let outcome = tracker.handle_fix(item).unwrap().expect("valid sample");

    assert!(outcome.room_change.is_none());
    assert_eq!(tracker.resolver().current_room().unwrap().id, "A");
    let position = tracker.current_position().unwrap();
    assert!(position.latitude > helpers::ORIGIN_LAT);
}

#[tokio::test]
async fn test_stop_tracking_clears_room_and_position() {
    let source = ScriptedPositionSource::new(vec![ScriptStep::Fix(fix_north(5.0, 4.0))]);
    let probe = source.probe();
    let mut tracker = tracker_with(source);
    tracker.start_tracking().await.unwrap();

    let room_rx = tracker.resolver().subscribe();
    let position_rx = tracker.subscribe_position();
    let changes_before = tracker.resolver().change_count();

    assert!(tracker.stop_tracking());

    assert!(room_rx.borrow().is_none());
    assert!(position_rx.borrow().is_none());
    assert_eq!(tracker.resolver().change_count(), changes_before + 1);
    assert_eq!(probe.cancelled().len(), 1);
    assert!(!probe.is_live());

    // Idempotent: nothing cancelled or published the second time
    assert!(!tracker.stop_tracking());
    assert_eq!(tracker.resolver().change_count(), changes_before + 1);
    assert_eq!(probe.cancelled().len(), 1);
}

#[tokio::test]
async fn test_stop_after_stream_closed_clears_room_and_position() {
    let source =
        ScriptedPositionSource::new(vec![ScriptStep::Fix(fix_north(5.0, 4.0))]).close_when_done();
    let mut tracker = tracker_with(source);
    tracker.start_tracking().await.unwrap();

    let closed = tracker.next_fix().await;
    assert!(closed.is_none());
    assert!(tracker.handle_fix(closed).unwrap().is_none());
    assert!(!tracker.is_tracking());

    // Closing the stream keeps the last room until an explicit stop
    assert_eq!(tracker.resolver().current_room().unwrap().id, "A");
    assert!(tracker.current_position().is_some());

    assert!(!tracker.stop_tracking());
    assert!(tracker.resolver().current_room().is_none());
    assert!(tracker.current_position().is_none());
}

#[tokio::test]
async fn test_no_samples_after_stop() {
    let source = ScriptedPositionSource::new(vec![ScriptStep::Fix(fix_north(5.0, 4.0))]);
    let probe = source.probe();
    let mut tracker = tracker_with(source);
    tracker.start_tracking().await.unwrap();

    tracker.stop_tracking();

    assert!(!probe.push(fix_north(101.0, 4.0)));
    let pending = tokio::time::timeout(Duration::from_millis(50), tracker.next_fix()).await;
    assert!(pending.is_err(), "stopped tracker must not yield samples");
}
