//! Room and track catalog
//!
//! The catalog is loaded once at startup and is immutable afterwards. Rooms
//! reference tracks through `audio_track_id`; the reference is not enforced
//! (an unknown id is logged and simply never resolves to a track).
//!
//! # File format
//!
//! ```toml
//! [[tracks]]
//! id = "1"
//! title = "Welcome to the Egyptian Museum"
//! description = "Introduction to the museum and its history"
//! url = "assets/audio/welcome.mp3"
//!
//! [[rooms]]
//! id = "1"
//! name = "Entrance Hall"
//! description = "Welcome to the Egyptian Museum of Turin"
//! latitude = 45.0677
//! longitude = 7.6847
//! radius = 15.0
//! audio_track_id = "1"
//! ```

use crate::geo::Coordinate;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// A circular geofence describing one exhibition room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Geofence radius in meters
    pub radius: f64,
    #[serde(alias = "audioTrackId")]
    pub audio_track_id: String,
}

impl Room {
    /// Geofence centre
    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// A room with a zero, negative or non-finite radius can never be entered
    pub fn has_usable_radius(&self) -> bool {
        self.radius.is_finite() && self.radius > 0.0
    }
}

/// A narration track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Locator handed to the audio engine as its source
    pub url: String,
    /// Duration in seconds, when known ahead of playback
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    rooms: Vec<Room>,
    #[serde(default)]
    tracks: Vec<Track>,
}

/// Validated, immutable room and track catalog
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    rooms: Vec<Arc<Room>>,
    tracks: Vec<Arc<Track>>,
}

impl Catalog {
    /// Build a catalog from room and track lists
    ///
    /// Fails on duplicate ids, invalid room centres, empty track urls or
    /// invalid track durations. Rooms without a usable radius and rooms that
    /// reference unknown tracks are kept but logged.
    pub fn new(rooms: Vec<Room>, tracks: Vec<Track>) -> Result<Self> {
        let mut track_ids = HashSet::new();
        for track in &tracks {
            if !track_ids.insert(track.id.as_str()) {
                return Err(Error::Catalog(format!("duplicate track id '{}'", track.id)));
            }
            if track.url.trim().is_empty() {
                return Err(Error::Catalog(format!("track '{}' has an empty url", track.id)));
            }
            if let Some(duration) = track.duration {
                if !duration.is_finite() || duration < 0.0 {
                    return Err(Error::Catalog(format!(
                        "track '{}' has invalid duration {}",
                        track.id, duration
                    )));
                }
            }
        }

        let mut room_ids = HashSet::new();
        for room in &rooms {
            if !room_ids.insert(room.id.as_str()) {
                return Err(Error::Catalog(format!("duplicate room id '{}'", room.id)));
            }
            if !room.center().is_valid() {
                return Err(Error::Catalog(format!(
                    "room '{}' has invalid centre ({}, {})",
                    room.id, room.latitude, room.longitude
                )));
            }
            if !room.has_usable_radius() {
                warn!(
                    room_id = %room.id,
                    radius = room.radius,
                    "Room radius is not positive; room will never be detected"
                );
            }
            if !track_ids.contains(room.audio_track_id.as_str()) {
                warn!(
                    room_id = %room.id,
                    track_id = %room.audio_track_id,
                    "Room references unknown track"
                );
            }
        }

        Ok(Self {
            rooms: rooms.into_iter().map(Arc::new).collect(),
            tracks: tracks.into_iter().map(Arc::new).collect(),
        })
    }

    /// Parse and validate a catalog from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::new(file.rooms, file.tracks)
    }

    /// Load and validate a catalog file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(&content)?;
        info!(
            "Loaded catalog from {}: {} rooms, {} tracks",
            path.display(),
            catalog.rooms.len(),
            catalog.tracks.len()
        );
        Ok(catalog)
    }

    /// Rooms in catalog order
    pub fn rooms(&self) -> &[Arc<Room>] {
        &self.rooms
    }

    /// Tracks in catalog order
    pub fn tracks(&self) -> &[Arc<Track>] {
        &self.tracks
    }

    pub fn room(&self, id: &str) -> Option<&Arc<Room>> {
        self.rooms.iter().find(|room| room.id == id)
    }

    pub fn track(&self, id: &str) -> Option<&Arc<Track>> {
        self.tracks.iter().find(|track| track.id == id)
    }

    /// The narration track a room points at, if the reference resolves
    pub fn track_for_room(&self, room: &Room) -> Option<&Arc<Track>> {
        self.track(&room.audio_track_id)
    }
}
