//! Quaternion attitude integration for the inertial heading source.
//!
//! Frames: world is NED, body is FRD (x forward, y right, z down). The running
//! quaternion maps body vectors into the world frame, so yaw extracted from it
//! is a compass heading (clockwise from north).

use nalgebra::{Quaternion, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::angles::{circular_std_dev, normalize_deg};
use crate::types::{History, RawMotion};

pub const STANDARD_GRAVITY: f64 = 9.80665;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InertialConfig {
    /// Integration step used when the sample spacing is unusable (s)
    pub nominal_interval_secs: f64,
    /// Measured spacing above this is treated as a gap (s)
    pub max_interval_secs: f64,
    /// Accelerometer magnitudes outside this band are not gravity (m/s²)
    pub gravity_min: f64,
    pub gravity_max: f64,
    /// Low-pass gain for the gravity reference
    pub gravity_gain: f64,
    /// Proportional tilt correction (rad/s per unit direction error)
    pub tilt_correction_gain: f64,
    /// Bias learning rate while the device is still
    pub bias_gain: f64,
    /// Angular rate under which the device counts as still (rad/s)
    pub still_rate_threshold: f64,
    /// Allowed |‖a‖ - g| while still (m/s²)
    pub still_accel_tolerance: f64,
    /// Headings kept for the calibration check
    pub calibration_window: usize,
    /// Circular std-dev under which the heading counts as calibrated (deg)
    pub calibration_threshold_deg: f64,
}

impl Default for InertialConfig {
    fn default() -> Self {
        Self {
            nominal_interval_secs: 0.1,
            max_interval_secs: 1.0,
            gravity_min: 0.5,
            gravity_max: 15.0,
            gravity_gain: 0.02,
            tilt_correction_gain: 0.5,
            bias_gain: 0.01,
            still_rate_threshold: 0.05,
            still_accel_tolerance: 0.3,
            calibration_window: 10,
            calibration_threshold_deg: 5.0,
        }
    }
}

/// Serializable copy of the filter state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrientationState {
    /// `[w, x, y, z]`
    pub quaternion: [f64; 4],
    pub gyro_bias: [f64; 3],
    pub accel_bias: [f64; 3],
    pub gravity: Option<[f64; 3]>,
    pub heading: f64,
    pub calibrated: bool,
}

pub struct InertialOrientationFilter {
    config: InertialConfig,
    q: UnitQuaternion<f64>,
    gyro_bias: Vector3<f64>,
    accel_bias: Vector3<f64>,
    /// Low-passed specific force in the body frame
    gravity: Option<Vector3<f64>>,
    last_timestamp: Option<f64>,
    headings: History<f64>,
    aligned: bool,
    integration_steps: u64,
}

impl InertialOrientationFilter {
    pub fn new(config: InertialConfig) -> Self {
        let headings = History::new(config.calibration_window);
        Self {
            config,
            q: UnitQuaternion::identity(),
            gyro_bias: Vector3::zeros(),
            accel_bias: Vector3::zeros(),
            gravity: None,
            last_timestamp: None,
            headings,
            aligned: false,
            integration_steps: 0,
        }
    }

    /// Unit quaternion from raw components; degenerate input resets to identity.
    fn unit_or_identity(q: Quaternion<f64>) -> UnitQuaternion<f64> {
        let norm = q.norm();
        if norm > 1e-9 && norm.is_finite() {
            UnitQuaternion::from_quaternion(q)
        } else {
            log::warn!("orientation quaternion degenerated (norm={norm}), resetting to identity");
            UnitQuaternion::identity()
        }
    }

    /// Rotation by `omega * dt`, identity for negligible rates.
    fn delta_rotation(omega: &Vector3<f64>, dt: f64) -> UnitQuaternion<f64> {
        let rate = omega.norm();
        if rate * dt < 1e-12 {
            return UnitQuaternion::identity();
        }
        UnitQuaternion::from_axis_angle(&Unit::new_normalize(*omega), rate * dt)
    }

    fn step_interval(&self, timestamp: f64) -> f64 {
        match self.last_timestamp {
            Some(prev) => {
                let dt = timestamp - prev;
                if dt.is_finite() && dt > 0.0 && dt <= self.config.max_interval_secs {
                    dt
                } else {
                    self.config.nominal_interval_secs
                }
            }
            None => self.config.nominal_interval_secs,
        }
    }

    fn is_still(&self, rate: &Vector3<f64>, accel: Option<&Vector3<f64>>) -> bool {
        let rate_ok = (rate - self.gyro_bias).norm() < self.config.still_rate_threshold;
        let accel_ok = accel
            .map(|a| (a.norm() - STANDARD_GRAVITY).abs() < self.config.still_accel_tolerance)
            .unwrap_or(false);
        rate_ok && accel_ok
    }

    /// Feed one motion sample. Samples with neither field are ignored.
    pub fn update(&mut self, sample: &RawMotion) {
        let accel = sample
            .acceleration
            .map(|a| Vector3::new(a[0], a[1], a[2]))
            .filter(|a| a.iter().all(|c| c.is_finite()));
        let rate = sample
            .rotation_rate
            .map(|r| Vector3::new(r[0], r[1], r[2]))
            .filter(|r| r.iter().all(|c| c.is_finite()));

        if let Some(a) = accel.as_ref() {
            self.update_gravity(a);
        }

        if let Some(rate) = rate {
            if self.is_still(&rate, accel.as_ref()) {
                let gain = self.config.bias_gain;
                self.gyro_bias = self.gyro_bias * (1.0 - gain) + rate * gain;
                if let Some(a) = accel.as_ref() {
                    let residual = a - a.normalize() * STANDARD_GRAVITY;
                    self.accel_bias = self.accel_bias * (1.0 - gain) + residual * gain;
                }
            }

            let dt = self.step_interval(sample.timestamp);
            self.integrate(&(rate - self.gyro_bias), dt);
        }

        if sample.timestamp.is_finite() {
            self.last_timestamp = Some(sample.timestamp);
        }
    }

    fn update_gravity(&mut self, accel: &Vector3<f64>) {
        let corrected = accel - self.accel_bias;
        let magnitude = corrected.norm();
        if magnitude < self.config.gravity_min || magnitude > self.config.gravity_max {
            log::debug!("accelerometer magnitude {magnitude:.2} outside gravity band, skipped");
            return;
        }

        let gain = self.config.gravity_gain;
        self.gravity = Some(match self.gravity {
            Some(g) => g * (1.0 - gain) + corrected * gain,
            None => corrected,
        });
    }

    /// Rotate a bias-corrected body rate into the world frame, add the tilt
    /// correction and left-multiply the resulting delta into the attitude.
    fn integrate(&mut self, body_rate: &Vector3<f64>, dt: f64) {
        let mut world_rate = self.q.transform_vector(body_rate);

        if let Some(g) = self.gravity {
            let norm = g.norm();
            if norm > 1e-9 {
                // Specific force at rest points up, i.e. -z in NED
                let measured_up = self.q.transform_vector(&(g / norm));
                let error = measured_up.cross(&Vector3::new(0.0, 0.0, -1.0));
                world_rate += error * self.config.tilt_correction_gain;
            }
        }

        let mut q = Self::delta_rotation(&world_rate, dt) * self.q;
        q.renormalize();
        self.q = Self::unit_or_identity(q.into_inner());
        self.integration_steps += 1;
        self.headings.push(self.heading());
    }

    /// Seed the yaw from an absolute reference, keeping the filter level.
    pub fn align_heading(&mut self, heading_deg: f64) {
        if !heading_deg.is_finite() {
            return;
        }
        self.q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), heading_deg.to_radians());
        self.headings.clear();
        self.aligned = true;
    }

    pub fn set_orientation(&mut self, quaternion: [f64; 4]) {
        let [w, x, y, z] = quaternion;
        self.q = Self::unit_or_identity(Quaternion::new(w, x, y, z));
    }

    /// Yaw `atan2(2(q0q3 + q1q2), 1 - 2(q2² + q3²))` in [0, 360).
    pub fn heading(&self) -> f64 {
        let (q0, q1, q2, q3) = (self.q.w, self.q.i, self.q.j, self.q.k);
        let yaw = (2.0 * (q0 * q3 + q1 * q2)).atan2(1.0 - 2.0 * (q2 * q2 + q3 * q3));
        normalize_deg(yaw.to_degrees())
    }

    /// Angle between the body down axis and world down (deg).
    pub fn tilt_deg(&self) -> f64 {
        let down = self.q.transform_vector(&Vector3::z());
        down.z.clamp(-1.0, 1.0).acos().to_degrees()
    }

    /// Circular spread of the recent headings, once the window is full.
    pub fn heading_spread(&self) -> Option<f64> {
        if !self.headings.is_full() {
            return None;
        }
        circular_std_dev(self.headings.iter().copied())
    }

    pub fn is_calibrated(&self) -> bool {
        self.heading_spread()
            .map(|spread| spread < self.config.calibration_threshold_deg)
            .unwrap_or(false)
    }

    pub fn is_aligned(&self) -> bool {
        self.aligned
    }

    /// True once at least one angular-rate sample was integrated.
    pub fn has_heading(&self) -> bool {
        self.integration_steps > 0
    }

    pub fn quaternion_norm(&self) -> f64 {
        self.q.quaternion().norm()
    }

    pub fn state(&self) -> OrientationState {
        OrientationState {
            quaternion: [self.q.w, self.q.i, self.q.j, self.q.k],
            gyro_bias: [self.gyro_bias.x, self.gyro_bias.y, self.gyro_bias.z],
            accel_bias: [self.accel_bias.x, self.accel_bias.y, self.accel_bias.z],
            gravity: self.gravity.map(|g| [g.x, g.y, g.z]),
            heading: self.heading(),
            calibrated: self.is_calibrated(),
        }
    }
}

impl Default for InertialOrientationFilter {
    fn default() -> Self {
        Self::new(InertialConfig::default())
    }
}
