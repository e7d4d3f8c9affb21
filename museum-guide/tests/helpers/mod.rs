//! Shared fixtures for museum-guide integration tests

#![allow(dead_code)]

use museum_common::catalog::{Catalog, Room, Track};
use museum_common::events::GuideEvent;
use museum_common::geo::{offset_meters, Coordinate};
use museum_guide::RawFix;
use std::time::Duration;
use tokio::sync::broadcast;

pub const ORIGIN_LAT: f64 = 45.0;
pub const ORIGIN_LON: f64 = 7.0;

pub fn origin() -> Coordinate {
    Coordinate::new(ORIGIN_LAT, ORIGIN_LON)
}

fn room(id: &str, north_m: f64, radius: f64, track_id: &str) -> Room {
    let centre = offset_meters(origin(), north_m, 0.0);
    Room {
        id: id.to_string(),
        name: format!("Room {}", id),
        description: String::new(),
        latitude: centre.latitude,
        longitude: centre.longitude,
        radius,
        audio_track_id: track_id.to_string(),
    }
}

fn track(id: &str, url: &str, duration: Option<f64>) -> Track {
    Track {
        id: id.to_string(),
        title: format!("Track {}", id),
        description: String::new(),
        url: url.to_string(),
        duration,
    }
}

/// Rooms A (origin), B (100 m north) and C (200 m north, unknown track),
/// each with a 10 m radius
pub fn sample_catalog() -> Catalog {
    Catalog::new(
        vec![
            room("A", 0.0, 10.0, "t-a"),
            room("B", 100.0, 10.0, "t-b"),
            room("C", 200.0, 10.0, "missing"),
        ],
        vec![
            track("t-a", "audio/a.mp3", Some(120.0)),
            track("t-b", "audio/b.mp3", None),
        ],
    )
    .expect("sample catalog is valid")
}

/// Fix `north_m` meters north of the origin
pub fn fix_north(north_m: f64, accuracy: f64) -> RawFix {
    RawFix::at(offset_meters(origin(), north_m, 0.0), accuracy)
}

/// Next event matching `want`, skipping others; panics after a second
pub async fn next_event(
    events: &mut broadcast::Receiver<GuideEvent>,
    want: impl Fn(&GuideEvent) -> bool,
) -> GuideEvent {
    let deadline = Duration::from_secs(1);
    loop {
        let event = tokio::time::timeout(deadline, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event bus closed");
        if want(&event) {
            return event;
        }
    }
}
