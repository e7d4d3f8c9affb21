//! # Museum Guide Common Library
//!
//! Shared code for the museum audio guide including:
//! - Geodesy (haversine great-circle distance)
//! - Room and track catalog types, loading and validation
//! - Configuration loading (TOML bootstrap file)
//! - Event types (GuideEvent enum) and the broadcast EventBus
//! - Timestamp helpers

pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod geo;
pub mod time;

pub use catalog::{Catalog, Room, Track};
pub use error::{Error, Result};
pub use geo::{haversine_distance, Coordinate, EARTH_RADIUS_M};
