//! Geographic calculations used when the routing provider is unavailable

use serde::{Deserialize, Serialize};

/// Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Road distance coefficient (straight line to road)
pub const ROAD_COEFFICIENT: f64 = 1.3;

/// Highway truck speed for fallback drive-time estimates
pub const DEFAULT_FALLBACK_SPEED_KMH: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Calculate Haversine distance between two points in kilometers
pub fn haversine_distance(from: &Coordinates, to: &Coordinates) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lon = (to.lng - from.lng).to_radians();

    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Estimate road distance from straight-line distance
pub fn road_distance(from: &Coordinates, to: &Coordinates) -> f64 {
    haversine_distance(from, to) * ROAD_COEFFICIENT
}

/// Estimated (distance_km, drive_hours) for a leg at the given average speed
pub fn estimate_leg(from: &Coordinates, to: &Coordinates, average_speed_kmh: f64) -> (f64, f64) {
    let distance = road_distance(from, to);
    let speed = if average_speed_kmh > 0.0 {
        average_speed_kmh
    } else {
        DEFAULT_FALLBACK_SPEED_KMH
    };
    (distance, distance / speed)
}
