//! Great-circle geodesy on a spherical Earth

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters used by the haversine formula
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// True when both components are finite and within the WGS84 ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Haversine distance in meters between two coordinates
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    // Rounding can push h just outside [0, 1] near the antipode
    let h = ((delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2))
    .clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Offset `origin` by a number of meters north and east
///
/// Small-distance approximation, accurate to well below a meter over the
/// geofence scales this crate deals with. Used to build synthetic traces.
pub fn offset_meters(origin: Coordinate, north_m: f64, east_m: f64) -> Coordinate {
    let dlat = (north_m / EARTH_RADIUS_M).to_degrees();
    let dlon = (east_m / (EARTH_RADIUS_M * origin.latitude.to_radians().cos())).to_degrees();
    Coordinate::new(origin.latitude + dlat, origin.longitude + dlon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        let p = Coordinate::new(45.0677, 7.6847);
        assert_eq!(haversine_distance(p, p), 0.0);
    }

    #[test]
    fn test_one_degree_latitude() {
        // One degree of arc on a 6371 km sphere
        let d = haversine_distance(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0));
        assert!((d - 111_194.93).abs() < 0.1, "got {}", d);
    }

    #[test]
    fn test_near_antipode_is_finite() {
        let a = Coordinate::new(0.01215, -89.9757);
        let b = Coordinate::new(-0.01215, 90.0243);
        let d = haversine_distance(a, b);
        assert!(d.is_finite(), "got {}", d);
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_M;
        assert!((d - half_circumference).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn test_symmetric() {
        let a = Coordinate::new(45.0677, 7.6847);
        let b = Coordinate::new(45.0681, 7.6851);
        assert!((haversine_distance(a, b) - haversine_distance(b, a)).abs() < 1e-9);
    }

    #[test]
    fn test_offset_meters_round_trip_distance() {
        let origin = Coordinate::new(45.0677, 7.6847);
        let moved = offset_meters(origin, 30.0, 40.0);
        let d = haversine_distance(origin, moved);
        assert!((d - 50.0).abs() < 0.05, "got {}", d);
    }

    #[test]
    fn test_validity() {
        assert!(Coordinate::new(90.0, -180.0).is_valid());
        assert!(!Coordinate::new(90.5, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, f64::NAN).is_valid());
    }
}
