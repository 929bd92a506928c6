//! Geospatial primitives for hospital and ambulance lookup.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude (and of longitude at the equator).
const METERS_PER_DEGREE: f64 = 111_320.0;

/// A WGS84 coordinate pair, longitude first (GeoJSON order).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// A timestamped position report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub point: GeoPoint,
    /// RFC3339 timestamp of the report
    pub recorded_at: String,
}

impl LocationFix {
    /// Create a fix stamped with the current time.
    pub fn now(point: GeoPoint) -> Self {
        Self {
            point,
            recorded_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Great-circle distance in meters between two points.
pub fn haversine_distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Bounding box `(min_lon, min_lat, max_lon, max_lat)` covering a radius
/// around a point.
///
/// Coarse prefilter for SQL range scans; callers must re-check the exact
/// distance of every candidate.
pub fn bounding_box(center: GeoPoint, radius_m: f64) -> (f64, f64, f64, f64) {
    let lat_delta = radius_m / METERS_PER_DEGREE;
    // Longitude degrees shrink with latitude; clamp the divisor near the poles.
    let lon_scale = center.lat.to_radians().cos().max(0.01);
    let lon_delta = radius_m / (METERS_PER_DEGREE * lon_scale);

    (
        center.lon - lon_delta,
        center.lat - lat_delta,
        center.lon + lon_delta,
        center.lat + lat_delta,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        let p = GeoPoint::new(-0.1278, 51.5074);
        assert_eq!(haversine_distance_m(p, p), 0.0);
    }

    #[test]
    fn test_london_to_paris() {
        let london = GeoPoint::new(-0.1278, 51.5074);
        let paris = GeoPoint::new(2.3522, 48.8566);
        let d = haversine_distance_m(london, paris);
        // Roughly 343 km great-circle
        assert!(d > 330_000.0 && d < 350_000.0, "got {}", d);
    }

    #[test]
    fn test_short_distance() {
        // Two points ~1.1 km apart along a meridian
        let a = GeoPoint::new(13.4050, 52.5200);
        let b = GeoPoint::new(13.4050, 52.5300);
        let d = haversine_distance_m(a, b);
        assert!(d > 1_000.0 && d < 1_200.0, "got {}", d);
    }

    #[test]
    fn test_bounding_box_contains_radius() {
        let center = GeoPoint::new(13.4050, 52.5200);
        let (min_lon, min_lat, max_lon, max_lat) = bounding_box(center, 20_000.0);

        assert!(min_lon < center.lon && max_lon > center.lon);
        assert!(min_lat < center.lat && max_lat > center.lat);

        // A point just inside the radius must fall inside the box
        let near = GeoPoint::new(13.4050, 52.5200 + 19_000.0 / 111_320.0);
        assert!(near.lat < max_lat && near.lat > min_lat);
    }
}
