//! Position samples
//!
//! `RawFix` is what a position source reports; `Position` is a fix that has
//! passed validation. Positions are immutable once built.

use museum_common::geo::Coordinate;
use serde::{Deserialize, Serialize};

/// Unvalidated fix as reported by a position source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Source-reported error radius in meters
    pub accuracy: f64,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl RawFix {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            timestamp,
        }
    }

    /// Fix at `coordinate` with the given accuracy, stamped with the current time
    pub fn at(coordinate: Coordinate, accuracy: f64) -> Self {
        Self::new(
            coordinate.latitude,
            coordinate.longitude,
            accuracy,
            museum_common::time::now_millis(),
        )
    }
}

/// Why a raw fix was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidFix {
    #[error("non-finite coordinate ({0}, {1})")]
    NonFinite(f64, f64),

    #[error("latitude {0} outside -90..=90")]
    LatitudeOutOfRange(f64),

    #[error("accuracy {0} is not a non-negative number")]
    BadAccuracy(f64),

    #[error("accuracy {accuracy} m exceeds limit of {limit} m")]
    TooInaccurate { accuracy: f64, limit: f64 },
}

/// Validated position sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp: i64,
}

impl Position {
    /// Validate and normalize a raw fix
    ///
    /// Longitude is wrapped into [-180, 180). Latitude must already be in
    /// range; a pole-crossing latitude means the source is broken.
    pub fn from_fix(fix: RawFix) -> Result<Self, InvalidFix> {
        if !fix.latitude.is_finite() || !fix.longitude.is_finite() {
            return Err(InvalidFix::NonFinite(fix.latitude, fix.longitude));
        }
        if !(-90.0..=90.0).contains(&fix.latitude) {
            return Err(InvalidFix::LatitudeOutOfRange(fix.latitude));
        }
        if !fix.accuracy.is_finite() || fix.accuracy < 0.0 {
            return Err(InvalidFix::BadAccuracy(fix.accuracy));
        }

        Ok(Self {
            latitude: fix.latitude,
            longitude: wrap_longitude(fix.longitude),
            accuracy: fix.accuracy,
            timestamp: fix.timestamp,
        })
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

fn wrap_longitude(longitude: f64) -> f64 {
    if (-180.0..180.0).contains(&longitude) {
        longitude
    } else {
        (longitude + 180.0).rem_euclid(360.0) - 180.0
    }
}
