use geo::{Coord, Intersects, Rect};
use std::f64::consts::PI;

use crate::models::{AccuracyTier, Coordinates, GpsVerificationResult, VerificationError, MAX_GPS_SCORE};

/// Earth radius in meters (for distance calculations)
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Default radius for `within_range` when the caller gives none
pub const DEFAULT_MAX_RANGE_METERS: f64 = 100.0;

const METERS_PER_DEGREE_LATITUDE: f64 = EARTH_RADIUS_METERS * PI / 180.0;

// (upper bound in meters, score, tier), evaluated in order
const GPS_TIERS: [(f64, u32, AccuracyTier); 3] = [
    (20.0, MAX_GPS_SCORE, AccuracyTier::Exact),
    (50.0, 35, AccuracyTier::Close),
    (100.0, 25, AccuracyTier::Near),
];

/// Great-circle distance between two points in meters using the Haversine formula.
///
/// Symmetric, zero for identical points, and always measures the shorter arc
/// across the antimeridian.
pub fn distance_meters(a: &Coordinates, b: &Coordinates) -> f64 {
    let lat1_rad = a.latitude.to_radians();
    let lat2_rad = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);

    // Rounding can push h marginally past 1 for antipodal points
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_METERS * c
}

/// Cheap rectangular pre-filter: `false` means `point` is certainly farther than
/// `range_meters` from `center`. A `true` still needs `distance_meters` to confirm.
///
/// A negative or non-finite range contains no points.
pub fn quick_bounding_box_check(point: &Coordinates, center: &Coordinates, range_meters: f64) -> bool {
    if !range_meters.is_finite() || range_meters < 0.0 {
        return false;
    }

    let lat_delta = range_meters / METERS_PER_DEGREE_LATITUDE;
    let reaches_pole = center.latitude + lat_delta >= 90.0 || center.latitude - lat_delta <= -90.0;

    // Meridians converge towards the poles, so the same range spans more degrees of longitude
    let cos_lat = center.latitude.to_radians().cos();
    let lon_delta = if reaches_pole || cos_lat <= f64::EPSILON {
        180.0
    } else {
        (lat_delta / cos_lat).min(180.0)
    };

    // Box is built around longitude 0 so it never straddles the antimeridian
    let bbox = Rect::new(
        Coord { x: -lon_delta, y: center.latitude - lat_delta },
        Coord { x: lon_delta, y: center.latitude + lat_delta },
    );
    let relative = Coord {
        x: normalize_longitude(point.longitude - center.longitude),
        y: point.latitude,
    };

    bbox.intersects(&relative)
}

/// Map a GPS distance onto its score and tier, using the default 100m range.
pub fn score_gps(distance: f64) -> Result<GpsVerificationResult, VerificationError> {
    score_gps_with_range(distance, DEFAULT_MAX_RANGE_METERS)
}

/// Map a GPS distance onto its score and tier.
///
/// `within_range` only compares against `max_range_meters`; the tiers are fixed.
pub fn score_gps_with_range(
    distance: f64,
    max_range_meters: f64,
) -> Result<GpsVerificationResult, VerificationError> {
    if !distance.is_finite() || distance < 0.0 {
        return Err(VerificationError::InvalidDistance(distance));
    }
    if !max_range_meters.is_finite() || max_range_meters < 0.0 {
        return Err(VerificationError::InvalidRange(max_range_meters));
    }

    let (score, accuracy_tier) = GPS_TIERS
        .iter()
        .find(|(limit, _, _)| distance <= *limit)
        .map(|(_, score, tier)| (*score, *tier))
        .unwrap_or((0, AccuracyTier::Far));

    Ok(GpsVerificationResult {
        distance_meters: distance.round() as u32,
        within_range: distance <= max_range_meters,
        score,
        accuracy_tier,
    })
}

/// Human readable distance: whole meters below 1km, one-decimal kilometers above.
///
/// The bucket is chosen from the raw value, so 999.9 renders as "1000m".
pub fn format_distance(meters: f64) -> Result<String, VerificationError> {
    if !meters.is_finite() || meters < 0.0 {
        return Err(VerificationError::InvalidDistance(meters));
    }

    if meters < 1000.0 {
        Ok(format!("{}m", meters.round() as i64))
    } else {
        Ok(format!("{:.1}km", meters / 1000.0))
    }
}

/// Candidates within `range_meters` of `origin`, nearest first.
pub fn nearest_within<T>(
    origin: &Coordinates,
    candidates: impl IntoIterator<Item = (T, Coordinates)>,
    range_meters: f64,
) -> Vec<(T, f64)> {
    let mut nearby: Vec<(T, f64)> = candidates
        .into_iter()
        .filter(|(_, location)| quick_bounding_box_check(location, origin, range_meters))
        .map(|(item, location)| {
            let distance = distance_meters(origin, &location);
            (item, distance)
        })
        .filter(|(_, distance)| *distance <= range_meters)
        .collect();

    nearby.sort_by(|a, b| a.1.total_cmp(&b.1));
    nearby
}

fn normalize_longitude(delta: f64) -> f64 {
    (delta + 180.0).rem_euclid(360.0) - 180.0
}
