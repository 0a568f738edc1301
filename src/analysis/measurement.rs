// src/analysis/measurement.rs
//
// Pure measurement math: pixel displacement to centimetres, great-circle
// distance between fixes, headings, and run metrics.

use crate::types::{BodyScaleConfig, PositionFix, RunMetrics};
use tracing::warn;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

// ============================================================================
// BODY SCALE
// ============================================================================

/// cm-per-pixel from the athlete's known height and their measured height in
/// pixels. None when the measurement is degenerate or outside the plausible
/// range in `body`.
pub fn cm_per_px(body: &BodyScaleConfig, body_height_px: f64) -> Option<f64> {
    if !body_height_px.is_finite() || body_height_px <= 0.0 {
        warn!("⚠️  Body height {:.1}px is not measurable", body_height_px);
        return None;
    }
    let scale = body.athlete_height_cm / body_height_px;
    if scale < body.min_cm_per_px || scale > body.max_cm_per_px {
        warn!(
            "⚠️  Scale {:.3} cm/px outside {:.2}..={:.2}, body measurement rejected",
            scale, body.min_cm_per_px, body.max_cm_per_px
        );
        return None;
    }
    Some(scale)
}

/// Horizontal distance in cm between two normalized x positions.
pub fn horizontal_distance_cm(from_x: f64, to_x: f64, frame_width_px: f64, cm_per_px: f64) -> f64 {
    (to_x - from_x).abs() * frame_width_px * cm_per_px
}

// ============================================================================
// GEODESY
// ============================================================================

pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);
    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

pub fn fix_distance(from: &PositionFix, to: &PositionFix) -> f64 {
    haversine_distance(from.latitude, from.longitude, to.latitude, to.longitude)
}

/// Initial bearing from `from` to `to`, degrees clockwise from north in [0, 360)
pub fn bearing(from: &PositionFix, to: &PositionFix) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Smallest angle between two headings, in [0, 180]
pub fn heading_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

// ============================================================================
// RUN METRICS
// ============================================================================

/// Elapsed time and average speed for a finished run. Speed is 0 when no
/// time has passed; the caller rejects that result as invalid.
pub fn run_metrics(distance_m: f64, start_ms: f64, end_ms: f64) -> RunMetrics {
    let time_s = ((end_ms - start_ms) / 1000.0).max(0.0);
    let speed_mps = if time_s > 0.0 { distance_m / time_s } else { 0.0 };
    RunMetrics {
        distance_m,
        time_s,
        speed_mps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(lat: f64, lon: f64) -> PositionFix {
        PositionFix {
            timestamp_ms: 0.0,
            latitude: lat,
            longitude: lon,
            accuracy_m: 5.0,
            heading_deg: None,
        }
    }

    #[test]
    fn test_haversine_distance() {
        let dist = haversine_distance(0.0, 0.0, 0.0, 1.0);
        assert!((dist - 111_195.0).abs() < 200.0);
        assert_eq!(haversine_distance(28.6, 77.2, 28.6, 77.2), 0.0);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = at(28.0, 77.0);
        assert!(bearing(&origin, &at(28.001, 77.0)).abs() < 0.01);
        assert!((bearing(&origin, &at(27.999, 77.0)) - 180.0).abs() < 0.01);
        assert!((bearing(&origin, &at(28.0, 77.001)) - 90.0).abs() < 0.1);
    }

    #[test]
    fn test_heading_difference_wraps() {
        assert_eq!(heading_difference(10.0, 350.0), 20.0);
        assert_eq!(heading_difference(0.0, 180.0), 180.0);
        assert_eq!(heading_difference(90.0, 90.0), 0.0);
        assert_eq!(heading_difference(170.0, 0.0), 170.0);
    }

    #[test]
    fn test_cm_per_px_range_check() {
        let body = BodyScaleConfig::default();
        let scale = cm_per_px(&body, 300.0).unwrap();
        assert!((scale - 170.0 / 300.0).abs() < 1e-12);
        assert!(cm_per_px(&body, 0.0).is_none());
        assert!(cm_per_px(&body, 10.0).is_none(), "17 cm/px is implausible");
        assert!(cm_per_px(&body, f64::NAN).is_none());
    }

    #[test]
    fn test_horizontal_distance_is_direction_independent() {
        let forward = horizontal_distance_cm(0.40, 0.62, 1000.0, 0.5);
        let backward = horizontal_distance_cm(0.62, 0.40, 1000.0, 0.5);
        assert!((forward - 110.0).abs() < 1e-9);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_run_metrics_zero_time_gives_zero_speed() {
        let metrics = run_metrics(30.0, 5000.0, 5000.0);
        assert_eq!(metrics.time_s, 0.0);
        assert_eq!(metrics.speed_mps, 0.0);

        let metrics = run_metrics(30.0, 3000.0, 9000.0);
        assert_eq!(metrics.time_s, 6.0);
        assert_eq!(metrics.speed_mps, 5.0);
    }
}
