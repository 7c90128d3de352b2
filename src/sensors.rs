//! Synthetic acquisition side.
//!
//! Stands in for the platform location/orientation/motion providers: a
//! straight walk with a little deterministic jitter, pushed into a session at
//! realistic rates. Used by the CLI and handy for soak-testing the pipeline.

use serde::{Deserialize, Serialize};
use tokio::time::{interval, Duration};

use crate::angles::normalize_deg;
use crate::error::TrackerError;
use crate::filters::inertial::STANDARD_GRAVITY;
use crate::filters::movement::offset_position;
use crate::session::{SensorSender, SessionClock};
use crate::types::{RawFix, RawMotion, RawOrientation};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyntheticWalk {
    pub origin_latitude: f64,
    pub origin_longitude: f64,
    /// Direction of travel, clockwise from north (deg)
    pub heading_deg: f64,
    pub speed_mps: f64,
    /// Unix time at which the walk is at the origin
    pub start_time: f64,
    /// Reported horizontal accuracy (m)
    pub accuracy: f64,
    /// Every n-th fix is emitted without coordinates (0 = never)
    pub dropout_every: u64,
}

impl SyntheticWalk {
    pub fn new(origin_latitude: f64, origin_longitude: f64, start_time: f64) -> Self {
        Self {
            origin_latitude,
            origin_longitude,
            heading_deg: 45.0,
            speed_mps: 1.4,
            start_time,
            accuracy: 5.0,
            dropout_every: 0,
        }
    }

    /// True position at `t` plus a small deterministic wobble.
    pub fn fix_at(&self, t: f64, seq: u64) -> RawFix {
        if self.dropout_every > 0 && seq > 0 && seq % self.dropout_every == 0 {
            return RawFix::new(t, f64::NAN, f64::NAN, self.accuracy);
        }

        let elapsed = (t - self.start_time).max(0.0);
        let distance = self.speed_mps * elapsed;
        let heading = self.heading_deg.to_radians();
        let wobble = (seq as f64 * 0.7).sin() * 0.5;
        let east = distance * heading.sin() + wobble;
        let north = distance * heading.cos() - wobble;
        let (lat, lon) = offset_position(self.origin_latitude, self.origin_longitude, east, north);

        let accuracy = self.accuracy + (seq as f64 * 0.1).sin() * 1.5;
        RawFix::new(t, lat, lon, accuracy.max(1.0)).with_course(self.heading_deg, self.speed_mps)
    }

    /// Compass reading a couple of degrees off the true course.
    pub fn orientation_at(&self, t: f64) -> RawOrientation {
        let jitter = (t * 0.9).sin() * 2.0;
        RawOrientation {
            timestamp: t,
            alpha: Some(normalize_deg(360.0 - self.heading_deg - jitter)),
            compass_heading: Some(normalize_deg(self.heading_deg + jitter)),
            compass_accuracy: Some(10.0),
        }
    }

    /// Level device, slight yaw sway and step bounce.
    pub fn motion_at(&self, t: f64) -> RawMotion {
        let step_phase = t * 2.0 * std::f64::consts::PI * 1.8;
        RawMotion {
            timestamp: t,
            acceleration: Some([
                step_phase.sin() * 0.3,
                (step_phase * 0.5).cos() * 0.1,
                -STANDARD_GRAVITY + step_phase.cos() * 0.4,
            ]),
            rotation_rate: Some([0.0, 0.0, (t * 0.5).sin() * 0.02]),
        }
    }
}

/// Location provider: one fix per `period`.
pub async fn fix_loop(sender: SensorSender, walk: SyntheticWalk, clock: SessionClock, period: Duration) {
    let mut ticker = interval(period);
    let mut seq = 0u64;

    loop {
        ticker.tick().await;
        let fix = walk.fix_at(clock.now(), seq);
        seq += 1;

        if let Err(TrackerError::NotRunning) = sender.on_raw_fix(fix) {
            log::debug!("[fix] session gone after {seq} fixes");
            break;
        }
        if seq % 10 == 0 {
            log::debug!("[fix] {seq} fixes");
        }
    }
}

pub async fn orientation_loop(sender: SensorSender, walk: SyntheticWalk, clock: SessionClock, period: Duration) {
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        if sender.on_raw_orientation(walk.orientation_at(clock.now())).is_err() {
            break;
        }
    }
}

pub async fn motion_loop(sender: SensorSender, walk: SyntheticWalk, clock: SessionClock, period: Duration) {
    let mut ticker = interval(period);
    let mut sample_count = 0u64;
    loop {
        ticker.tick().await;
        if sender.on_raw_motion(walk.motion_at(clock.now())).is_err() {
            log::debug!("[motion] session gone after {sample_count} samples");
            break;
        }
        sample_count += 1;
    }
}
