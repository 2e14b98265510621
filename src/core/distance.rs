use geo::{HaversineDistance, Point};

use crate::models::{BoundingBox, Coordinate};

/// Kilometres per degree of latitude used by the bounding box approximation
const KM_PER_DEGREE: f64 = 111.0;

#[inline]
fn to_point(coordinate: Coordinate) -> Point<f64> {
    Point::new(coordinate.lng, coordinate.lat)
}

/// Great-circle (haversine) distance between two coordinates in metres
///
/// Symmetric and zero for identical points. Out-of-range coordinates must be
/// rejected by the caller beforehand.
#[inline]
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    to_point(a).haversine_distance(&to_point(b))
}

/// Great-circle distance between two coordinates in kilometres
#[inline]
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    distance_meters(a, b) / 1000.0
}

/// `true` when `b` lies within `radius_meters` of `a` (boundary inclusive)
#[inline]
pub fn is_within_radius(a: Coordinate, b: Coordinate, radius_meters: f64) -> bool {
    distance_meters(a, b) <= radius_meters
}

/// Calculate a bounding box around a center point
///
/// Cheap rectangular pre-filter for store queries; slightly larger than the
/// true radius. 1° latitude ≈ 111km, 1° longitude ≈ 111km * cos(latitude).
pub fn calculate_bounding_box(center: Coordinate, radius_km: f64) -> BoundingBox {
    let lat_delta = radius_km / KM_PER_DEGREE;

    // Near the poles a degree of longitude collapses, so cover every meridian
    let cos_lat = center.lat.to_radians().cos().abs();
    let lon_delta = if cos_lat < 1e-6 {
        180.0
    } else {
        (radius_km / (KM_PER_DEGREE * cos_lat)).min(180.0)
    };

    BoundingBox {
        min_lat: (center.lat - lat_delta).max(-90.0),
        max_lat: (center.lat + lat_delta).min(90.0),
        min_lon: (center.lng - lon_delta).max(-180.0),
        max_lon: (center.lng + lon_delta).min(180.0),
    }
}

/// Check if a point is within a bounding box
#[inline]
pub fn is_within_bounding_box(coordinate: Coordinate, bbox: &BoundingBox) -> bool {
    coordinate.lat >= bbox.min_lat
        && coordinate.lat <= bbox.max_lat
        && coordinate.lng >= bbox.min_lon
        && coordinate.lng <= bbox.max_lon
}
