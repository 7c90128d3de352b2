use serde::{Deserialize, Serialize};

use crate::angles::normalize_deg;
use crate::types::{PositionSnapshot, VelocityEstimate};

/// Meters per degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEGREE: f64 = 111_320.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Below this displacement (m) heading is withheld as jitter
    pub min_heading_distance: f64,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            min_heading_distance: 0.5,
        }
    }
}

/// Local equirectangular offset `(east, north)` in meters from `from` to `to`.
pub fn local_offset_m(from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> (f64, f64) {
    let mean_lat = 0.5 * (from_lat + to_lat);
    let north = (to_lat - from_lat) * METERS_PER_DEGREE;
    let east = (to_lon - from_lon) * METERS_PER_DEGREE * mean_lat.to_radians().cos();
    (east, north)
}

/// Inverse of [`local_offset_m`]: shift a coordinate by `(east, north)` meters.
pub fn offset_position(lat: f64, lon: f64, east: f64, north: f64) -> (f64, f64) {
    let new_lat = lat + north / METERS_PER_DEGREE;
    let mean_lat = 0.5 * (lat + new_lat);
    let cos_lat = mean_lat.to_radians().cos().max(1e-9);
    let new_lon = lon + east / (METERS_PER_DEGREE * cos_lat);
    (new_lat, new_lon)
}

/// Derives speed, distance and direction of travel from consecutive fixes.
pub struct MovementEstimator {
    config: MovementConfig,
}

impl MovementEstimator {
    pub fn new(config: MovementConfig) -> Self {
        Self { config }
    }

    /// Returns `None` when the fixes are not strictly ordered in time.
    pub fn estimate(
        &self,
        previous: &PositionSnapshot,
        current: &PositionSnapshot,
    ) -> Option<VelocityEstimate> {
        let elapsed = current.timestamp - previous.timestamp;
        if !elapsed.is_finite() || elapsed <= 0.0 {
            return None;
        }

        let (east, north) = local_offset_m(
            previous.latitude,
            previous.longitude,
            current.latitude,
            current.longitude,
        );
        let distance = east.hypot(north);
        if !distance.is_finite() {
            return None;
        }

        let heading = if distance > self.config.min_heading_distance {
            Some(normalize_deg(east.atan2(north).to_degrees()))
        } else {
            None
        };

        Some(VelocityEstimate {
            heading,
            speed: distance / elapsed,
            distance,
            elapsed,
        })
    }

    /// Velocity `(east, north)` in m/s between two fixes.
    pub fn velocity_en(
        previous: &PositionSnapshot,
        current: &PositionSnapshot,
    ) -> Option<(f64, f64)> {
        let elapsed = current.timestamp - previous.timestamp;
        if !elapsed.is_finite() || elapsed <= 0.0 {
            return None;
        }
        let (east, north) = local_offset_m(
            previous.latitude,
            previous.longitude,
            current.latitude,
            current.longitude,
        );
        Some((east / elapsed, north / elapsed))
    }
}

impl Default for MovementEstimator {
    fn default() -> Self {
        Self::new(MovementConfig::default())
    }
}
