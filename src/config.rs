//! Aggregate configuration for a tracking session.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides:
//!
//! ```json
//! { "fusion": { "reference_total": 0.8 }, "declination": { "model": "dipole" } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::filters::dead_reckoning::DeadReckoningConfig;
use crate::filters::inertial::InertialConfig;
use crate::filters::movement::MovementConfig;
use crate::filters::position::PositionFilterConfig;
use crate::fusion::declination::DeclinationSetting;
use crate::fusion::engine::FusionConfig;
use crate::satellites::geometry::SatelliteConfig;
use crate::satellites::trajectory::TrajectoryConfig;
use crate::satellites::triangulation::TriangulationConfig;

/// How the pipeline turns raw readings into heading sources.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingSourcesConfig {
    /// Device headings older than this are not fused (s)
    pub device_max_age_secs: f64,
    /// Used when the platform reports no compass accuracy
    pub device_default_confidence: f64,
    /// Compass accuracy (deg) at which confidence reaches zero
    pub device_accuracy_span_deg: f64,
    pub inertial_calibrated_confidence: f64,
    pub inertial_uncalibrated_confidence: f64,
    /// Speed (m/s) at which the movement heading reaches full confidence
    pub movement_full_confidence_speed: f64,
    /// Minimum reported speed (m/s) for trusting the provider's own course
    pub course_min_speed: f64,
    /// Movement headings lapse this long after the fix they came from (s)
    pub movement_max_age_secs: f64,
}

impl Default for HeadingSourcesConfig {
    fn default() -> Self {
        Self {
            device_max_age_secs: 2.0,
            device_default_confidence: 0.7,
            device_accuracy_span_deg: 90.0,
            inertial_calibrated_confidence: 0.8,
            inertial_uncalibrated_confidence: 0.4,
            movement_full_confidence_speed: 2.0,
            course_min_speed: 0.5,
            movement_max_age_secs: 3.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub tick_interval_ms: u64,
    /// No real fix for this long moves Tracking to Degraded (s)
    pub staleness_secs: f64,
    pub input_capacity: usize,
    pub output_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            staleness_secs: 3.0,
            input_capacity: 256,
            output_capacity: 256,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub position: PositionFilterConfig,
    pub movement: MovementConfig,
    pub dead_reckoning: DeadReckoningConfig,
    pub satellites: SatelliteConfig,
    pub triangulation: TriangulationConfig,
    pub trajectory: TrajectoryConfig,
    pub inertial: InertialConfig,
    pub fusion: FusionConfig,
    pub sources: HeadingSourcesConfig,
    pub declination: DeclinationSetting,
    pub session: SessionConfig,
}

fn check(ok: bool, field: &'static str, reason: &str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, reason))
    }
}

fn unit(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl TrackerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.position;
        check(positive(p.gain), "position.gain", "must be positive")?;
        check(p.max_factor > 0.0 && p.max_factor <= 1.0, "position.max_factor", "must be in (0, 1]")?;
        check(positive(p.fallback_accuracy), "position.fallback_accuracy", "must be positive")?;
        check(p.history_capacity >= 2, "position.history_capacity", "must hold at least two fixes")?;

        check(
            self.movement.min_heading_distance >= 0.0,
            "movement.min_heading_distance",
            "must not be negative",
        )?;

        let dr = &self.dead_reckoning;
        check(dr.min_elapsed_secs >= 0.0, "dead_reckoning.min_elapsed_secs", "must not be negative")?;
        check(
            dr.max_prediction_secs > dr.min_elapsed_secs,
            "dead_reckoning.max_prediction_secs",
            "must exceed min_elapsed_secs",
        )?;

        let sat = &self.satellites;
        check(
            (0.0..90.0).contains(&sat.elevation_mask_deg),
            "satellites.elevation_mask_deg",
            "must be in [0, 90)",
        )?;
        check(sat.history_capacity >= 2, "satellites.history_capacity", "must hold at least two snapshots")?;
        for params in &sat.constellations {
            params.validate()?;
        }

        let tri = &self.triangulation;
        check(tri.min_satellites >= 1, "triangulation.min_satellites", "must be at least 1")?;
        check(positive(tri.isolation_scale_deg), "triangulation.isolation_scale_deg", "must be positive")?;
        check(unit(tri.isolation_floor), "triangulation.isolation_floor", "must be in [0, 1]")?;
        check(unit(tri.min_resultant), "triangulation.min_resultant", "must be in [0, 1]")?;

        check(positive(self.trajectory.horizon_secs), "trajectory.horizon_secs", "must be positive")?;

        let imu = &self.inertial;
        check(positive(imu.nominal_interval_secs), "inertial.nominal_interval_secs", "must be positive")?;
        check(
            imu.gravity_min < imu.gravity_max,
            "inertial.gravity_min",
            "must be below gravity_max",
        )?;
        check(unit(imu.gravity_gain), "inertial.gravity_gain", "must be in [0, 1]")?;
        check(unit(imu.bias_gain), "inertial.bias_gain", "must be in [0, 1]")?;
        check(imu.calibration_window >= 2, "inertial.calibration_window", "must be at least 2")?;

        self.fusion.validate()?;

        let src = &self.sources;
        check(positive(src.device_max_age_secs), "sources.device_max_age_secs", "must be positive")?;
        check(unit(src.device_default_confidence), "sources.device_default_confidence", "must be in [0, 1]")?;
        check(positive(src.device_accuracy_span_deg), "sources.device_accuracy_span_deg", "must be positive")?;
        check(
            unit(src.inertial_calibrated_confidence) && unit(src.inertial_uncalibrated_confidence),
            "sources.inertial_confidence",
            "must be in [0, 1]",
        )?;
        check(
            positive(src.movement_full_confidence_speed),
            "sources.movement_full_confidence_speed",
            "must be positive",
        )?;
        check(positive(src.movement_max_age_secs), "sources.movement_max_age_secs", "must be positive")?;

        let s = &self.session;
        check(s.tick_interval_ms > 0, "session.tick_interval_ms", "must be positive")?;
        check(positive(s.staleness_secs), "session.staleness_secs", "must be positive")?;
        check(s.input_capacity > 0, "session.input_capacity", "must be positive")?;
        check(s.output_capacity > 0, "session.output_capacity", "must be positive")?;

        Ok(())
    }
}
