//! Room resolution with hysteresis
//!
//! Maps each position sample to at most one room:
//! - A room is a candidate when its radius is positive and the haversine
//!   distance from the sample to its centre is within the radius.
//! - Among candidates the nearest centre wins; on an exact tie the room that
//!   comes first in catalog order is kept.
//! - The current room only changes when a candidate exists and differs from
//!   it. A sample with no candidate leaves the current room as it is, so a
//!   visitor standing in the noisy margin of a geofence does not flap in and
//!   out of the room.

use crate::error::{Error, Result};
use crate::observable::Observable;
use crate::position::Position;
use museum_common::catalog::{Catalog, Room};
use museum_common::geo::{haversine_distance, Coordinate};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// A transition of the current room
#[derive(Debug, Clone)]
pub struct RoomChange {
    pub previous: Option<Arc<Room>>,
    pub current: Arc<Room>,
    /// Distance to the room centre for detected rooms; `None` for manual selection
    pub distance_m: Option<f64>,
}

/// Owns the current-room reference
pub struct RoomResolver {
    rooms: Vec<Arc<Room>>,
    current: Observable<Option<Arc<Room>>>,
}

impl RoomResolver {
    pub fn new(rooms: Vec<Arc<Room>>) -> Self {
        Self {
            rooms,
            current: Observable::new(None),
        }
    }

    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self::new(catalog.rooms().to_vec())
    }

    pub fn rooms(&self) -> &[Arc<Room>] {
        &self.rooms
    }

    /// Nearest room whose geofence contains `point`, with its distance
    ///
    /// Pure: does not touch the current room.
    pub fn nearest_room(&self, point: Coordinate) -> Option<(&Arc<Room>, f64)> {
        let mut nearest: Option<(&Arc<Room>, f64)> = None;

        for room in &self.rooms {
            if !room.has_usable_radius() {
                continue;
            }
            let distance = haversine_distance(point, room.center());
            if distance.is_nan() || distance > room.radius {
                continue;
            }
            // Strict comparison keeps the earlier room on exact ties
            if nearest.map_or(true, |(_, best)| distance < best) {
                nearest = Some((room, distance));
            }
        }

        nearest
    }

    /// Resolve a sample and update the current room
    ///
    /// Returns the transition if the current room changed.
    pub fn update(&mut self, position: &Position) -> Option<RoomChange> {
        let (room, distance) = match self.nearest_room(position.coordinate()) {
            Some((room, distance)) => (Arc::clone(room), distance),
            None => {
                debug!(
                    lat = position.latitude,
                    lon = position.longitude,
                    "No room within range; keeping current room"
                );
                return None;
            }
        };

        let change = self.enter(room, Some(distance));
        if let Some(change) = &change {
            info!(
                room_id = %change.current.id,
                distance_m = distance,
                accuracy_m = position.accuracy,
                "Entered room {}",
                change.current.name
            );
        }
        change
    }

    /// Set the current room by id, bypassing position resolution
    ///
    /// Used as the fallback when no position source is available.
    /// Selecting the room the visitor is already in reports no change.
    pub fn select_room(&mut self, room_id: &str) -> Result<Option<RoomChange>> {
        let room = self
            .rooms
            .iter()
            .find(|room| room.id == room_id)
            .cloned()
            .ok_or_else(|| Error::RoomNotFound(room_id.to_string()))?;

        let change = self.enter(room, None);
        if let Some(change) = &change {
            info!(room_id = %change.current.id, "Room selected manually");
        }
        Ok(change)
    }

    fn enter(&mut self, room: Arc<Room>, distance_m: Option<f64>) -> Option<RoomChange> {
        let previous = self.current.get();
        if previous.as_ref().is_some_and(|prev| prev.id == room.id) {
            return None;
        }

        self.current.publish(Some(Arc::clone(&room)));
        Some(RoomChange {
            previous,
            current: room,
            distance_m,
        })
    }

    /// Forget the current room; returns true if one was set
    pub fn clear(&mut self) -> bool {
        if self.current.with(|room| room.is_none()) {
            return false;
        }
        self.current.publish(None);
        debug!("Current room cleared");
        true
    }

    pub fn current_room(&self) -> Option<Arc<Room>> {
        self.current.get()
    }

    /// Last-value-cached stream of the current room
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Room>>> {
        self.current.subscribe()
    }

    /// Number of room notifications published so far
    pub fn change_count(&self) -> u64 {
        self.current.version()
    }
}
