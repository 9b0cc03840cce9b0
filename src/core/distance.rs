use crate::models::{BoundingBox, Coordinate};

/// Earth's radius in miles. Stored search thresholds assume this exact value.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Calculate the Haversine distance between two points in miles
///
/// Uses the `atan2` form, which stays stable for nearly antipodal points.
/// Coordinates are not range-checked here.
#[inline]
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1_rad = a.latitude.to_radians();
    let lat2_rad = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push h just past 1 for nearly antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_MILES * c
}

/// Relative widening applied to the angular radius of a bounding box
const BOX_RELATIVE_MARGIN: f64 = 1e-9;

/// Absolute widening of each box edge, in degrees (about 0.1 mm)
const BOX_EDGE_MARGIN_DEGREES: f64 = 1e-9;

/// Calculate a bounding box that contains every point within `radius_miles`
/// of `center`
///
/// The box is only a pre-filter for the row source; the haversine test stays
/// authoritative. It is widened by a tiny margin so that a point lying exactly
/// on the radius survives rounding. When the circle touches a pole or wraps
/// the antimeridian the longitude range opens to the whole globe.
pub fn calculate_bounding_box(center: Coordinate, radius_miles: f64) -> BoundingBox {
    let angular = radius_miles / EARTH_RADIUS_MILES * (1.0 + BOX_RELATIVE_MARGIN);
    let delta_lat = angular.to_degrees() + BOX_EDGE_MARGIN_DEGREES;

    let min_lat = center.latitude - delta_lat;
    let max_lat = center.latitude + delta_lat;

    let whole_globe = |min_lat: f64, max_lat: f64| BoundingBox {
        min_lat: min_lat.max(-90.0),
        max_lat: max_lat.min(90.0),
        min_lon: -180.0,
        max_lon: 180.0,
    };

    if min_lat <= -90.0 || max_lat >= 90.0 {
        return whole_globe(min_lat, max_lat);
    }

    let ratio = angular.sin() / center.latitude.to_radians().cos();
    if ratio.is_nan() || ratio >= 1.0 {
        return whole_globe(min_lat, max_lat);
    }

    let delta_lon = ratio.asin().to_degrees() + BOX_EDGE_MARGIN_DEGREES;
    let min_lon = center.longitude - delta_lon;
    let max_lon = center.longitude + delta_lon;

    if min_lon < -180.0 || max_lon > 180.0 {
        return whole_globe(min_lat, max_lat);
    }

    BoundingBox {
        min_lat,
        max_lat,
        min_lon,
        max_lon,
    }
}

/// Check if a point is within a bounding box
#[inline]
pub fn is_within_bounding_box(point: Coordinate, bbox: &BoundingBox) -> bool {
    point.latitude >= bbox.min_lat
        && point.latitude <= bbox.max_lat
        && point.longitude >= bbox.min_lon
        && point.longitude <= bbox.max_lon
}
