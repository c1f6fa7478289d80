//! geo.rs — Short-range geodesy helpers
//!
//! Two distance models:
//! - **Planar**: lat/lon degrees treated as Euclidean units, scaled by a fixed
//!   degrees→meters factor. Ignores the cos(lat) shrink of longitude, so east-west
//!   distances are overestimated away from the equator. Kept for compatibility
//!   with existing mission tuning (arrival radii were chosen against it).
//! - **Haversine**: great-circle distance on a spherical Earth.

use crate::Position;

/// Meters per degree used by the planar approximation
pub const PLANAR_DEG_TO_M: f64 = 1.113195e5;

/// Spherical Earth radius (meters)
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Planar horizontal distance in meters (degrees × [`PLANAR_DEG_TO_M`]).
pub fn planar_distance_m(a: &Position, b: &Position) -> f64 {
    let dlat = b.lat - a.lat;
    let dlon = b.lon - a.lon;
    (dlat * dlat + dlon * dlon).sqrt() * PLANAR_DEG_TO_M
}

/// Great-circle horizontal distance in meters.
pub fn haversine_distance_m(a: &Position, b: &Position) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// North/east offset in meters from `from` to `to` (local tangent plane).
pub fn local_delta_m(from: &Position, to: &Position) -> (f64, f64) {
    let north = (to.lat - from.lat).to_radians() * EARTH_RADIUS_M;
    let east = (to.lon - from.lon).to_radians() * EARTH_RADIUS_M * from.lat.to_radians().cos();
    (north, east)
}

/// Position `north`/`east` meters away from `origin`, same altitude.
/// Accurate to well under a meter for offsets of a few kilometers.
pub fn offset_m(origin: &Position, north: f64, east: f64) -> Position {
    let dlat = north / EARTH_RADIUS_M;
    let dlon = east / (EARTH_RADIUS_M * origin.lat.to_radians().cos());
    Position::new(
        origin.lat + dlat.to_degrees(),
        origin.lon + dlon.to_degrees(),
        origin.alt,
    )
}
