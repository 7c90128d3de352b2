//! Pure computation layer of the tracker.
//!
//! Nothing in here knows about tokio, channels, files or wall-clock time.
//! Samples go in through `feed_*`, the 100 ms cadence comes in through
//! `tick(now)`, and outputs come back as a Vec in processing order. The
//! session drives it live; the replay binary and the tests drive it directly.

use serde::{Deserialize, Serialize};

use crate::config::{HeadingSourcesConfig, TrackerConfig};
use crate::error::{AcquisitionErrorKind, ConfigError, TrackerError};
use crate::filters::dead_reckoning::DeadReckoningPredictor;
use crate::filters::inertial::InertialOrientationFilter;
use crate::filters::movement::MovementEstimator;
use crate::filters::position::PositionFilter;
use crate::fusion::declination::DeclinationModel;
use crate::fusion::engine::HeadingFusionEngine;
use crate::satellites::geometry::{GeometrySource, Observer, SatelliteSnapshot, SyntheticConstellationModel};
use crate::satellites::quality::GeometryQuality;
use crate::satellites::trajectory::TrajectoryHeadingPredictor;
use crate::satellites::triangulation::GeometricHeadingTriangulator;
use crate::state_machine::{TrackingEvent, TrackingState, TrackingStateMachine};
use crate::status::TrackerStatus;
use crate::types::{
    FusionResult, HeadingEstimate, HeadingSource, History, PositionMeta, PositionUpdate, RawFix,
    RawMotion, RawOrientation, SmoothedPosition, SourceTag, VelocityEstimate,
};

// ─── Outputs ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TrackerOutput {
    Position(PositionUpdate),
    Heading(FusionResult),
    Error(TrackerError),
}

/// Last usable device compass reading, already corrected to true north.
#[derive(Clone, Copy, Debug)]
struct DeviceHeading {
    heading: f64,
    confidence: f64,
    timestamp: f64,
}

/// Course and speed reported by the location provider itself.
#[derive(Clone, Copy, Debug)]
struct ProviderCourse {
    heading: f64,
    speed: f64,
}

#[derive(Default)]
struct Counters {
    position_updates: u64,
    headings_fused: u64,
    errors_reported: u64,
}

// ─── The pipeline ────────────────────────────────────────────────────────────

pub struct FusionPipeline {
    sources_config: HeadingSourcesConfig,
    max_prediction_secs: f64,

    position: PositionFilter,
    movement: MovementEstimator,
    dead_reckoning: DeadReckoningPredictor,
    geometry: Box<dyn GeometrySource>,
    triangulator: GeometricHeadingTriangulator,
    trajectory: TrajectoryHeadingPredictor,
    sky_history: History<SatelliteSnapshot>,
    inertial: InertialOrientationFilter,
    fusion: HeadingFusionEngine,
    declination: Box<dyn DeclinationModel>,
    state: TrackingStateMachine,

    velocity: Option<VelocityEstimate>,
    provider_course: Option<ProviderCourse>,
    device_heading: Option<DeviceHeading>,
    satellite_estimate: Option<HeadingEstimate>,
    trajectory_estimate: Option<HeadingEstimate>,
    quality: Option<GeometryQuality>,
    last_position: Option<PositionUpdate>,
    last_heading: Option<FusionResult>,
    motion_seen: bool,
    stale_reported: bool,
    counters: Counters,
}

impl FusionPipeline {
    /// Pipeline over the built-in synthetic constellation.
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        let geometry = Box::new(SyntheticConstellationModel::new(&config.satellites));
        Self::with_geometry_source(config, geometry)
    }

    pub fn with_geometry_source(
        config: TrackerConfig,
        geometry: Box<dyn GeometrySource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            sources_config: config.sources.clone(),
            max_prediction_secs: config.dead_reckoning.max_prediction_secs,
            position: PositionFilter::new(config.position.clone()),
            movement: MovementEstimator::new(config.movement.clone()),
            dead_reckoning: DeadReckoningPredictor::new(config.dead_reckoning.clone()),
            geometry,
            triangulator: GeometricHeadingTriangulator::new(config.triangulation.clone()),
            trajectory: TrajectoryHeadingPredictor::new(config.trajectory.clone(), config.triangulation.clone()),
            sky_history: History::new(config.satellites.history_capacity),
            inertial: InertialOrientationFilter::new(config.inertial.clone()),
            fusion: HeadingFusionEngine::new(config.fusion.clone()),
            declination: config.declination.build(),
            state: TrackingStateMachine::new(config.session.staleness_secs),
            velocity: None,
            provider_course: None,
            device_heading: None,
            satellite_estimate: None,
            trajectory_estimate: None,
            quality: None,
            last_position: None,
            last_heading: None,
            motion_seen: false,
            stale_reported: false,
            counters: Counters::default(),
        })
    }

    pub fn state(&self) -> TrackingState {
        self.state.state()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn start(&mut self) {
        if self.state.handle(TrackingEvent::Start).is_none() {
            log::debug!("start ignored in state {}", self.state());
        }
    }

    pub fn stop(&mut self) {
        self.state.handle(TrackingEvent::Stop);
    }

    /// Smooth a raw fix and refresh everything derived from position.
    pub fn feed_fix(&mut self, fix: &RawFix) -> Vec<TrackerOutput> {
        let mut outputs = Vec::new();
        if !self.is_running() {
            log::debug!("fix at t={:.3} ignored in state {}", fix.timestamp, self.state());
            return outputs;
        }

        let smoothed = match self.position.update(fix) {
            Ok(smoothed) => smoothed,
            Err(err) => {
                log::warn!("{err}; keeping last good position");
                return outputs;
            }
        };

        let history = self.position.history();
        if let (Some(prev), Some(cur)) = (history.get_back(1), history.get_back(0)) {
            self.velocity = self.movement.estimate(prev, cur);
        }
        self.provider_course = match (fix.heading, fix.speed) {
            (Some(heading), Some(speed)) if heading.is_finite() && speed.is_finite() => {
                Some(ProviderCourse { heading, speed })
            }
            _ => None,
        };

        self.state.handle(TrackingEvent::RealFix {
            timestamp: smoothed.timestamp,
        });
        self.stale_reported = false;

        self.refresh_sky(&smoothed);

        let update = PositionUpdate {
            latitude: smoothed.latitude,
            longitude: smoothed.longitude,
            altitude: smoothed.altitude,
            accuracy: smoothed.accuracy,
            velocity: self.velocity,
            meta: self.next_meta(true, smoothed.timestamp),
        };
        self.last_position = Some(update.clone());
        outputs.push(TrackerOutput::Position(update));
        outputs
    }

    /// Store the device compass heading; the first one also seeds the inertial yaw.
    pub fn feed_orientation(&mut self, sample: &RawOrientation) {
        if !self.is_running() {
            return;
        }

        let magnetic = sample
            .compass_heading
            .filter(|h| h.is_finite())
            .or_else(|| sample.alpha.filter(|a| a.is_finite()).map(|a| 360.0 - a));
        let Some(magnetic) = magnetic else {
            log::warn!(
                "{}",
                TrackerError::InvalidSample(format!("orientation at t={} has no heading", sample.timestamp))
            );
            return;
        };

        let heading = match self.position.current() {
            Some(pos) => self.declination.to_true(magnetic, pos.latitude, pos.longitude),
            None => crate::angles::normalize_deg(magnetic),
        };

        let cfg = &self.sources_config;
        let confidence = match sample.compass_accuracy.filter(|a| a.is_finite() && *a >= 0.0) {
            Some(accuracy) => (1.0 - accuracy / cfg.device_accuracy_span_deg).clamp(0.0, 1.0),
            None => cfg.device_default_confidence,
        };

        if !self.inertial.is_aligned() {
            self.inertial.align_heading(heading);
            log::info!("inertial yaw aligned to device heading {heading:.1}°");
        }

        self.device_heading = Some(DeviceHeading {
            heading,
            confidence,
            timestamp: sample.timestamp,
        });
    }

    pub fn feed_motion(&mut self, sample: &RawMotion) {
        if !self.is_running() {
            return;
        }
        self.inertial.update(sample);
        if sample.rotation_rate.is_some() {
            self.motion_seen = true;
        }
    }

    /// Forward a provider failure; fatal kinds stop the session.
    pub fn feed_acquisition_error(&mut self, kind: AcquisitionErrorKind, message: &str) -> Vec<TrackerOutput> {
        if self.state() == TrackingState::Stopped {
            return Vec::new();
        }

        let err = TrackerError::from_acquisition(kind, message);
        log::warn!("acquisition error: {err}");
        if err.is_fatal() {
            self.state.handle(TrackingEvent::Fatal);
        }
        self.counters.errors_reported += 1;
        vec![TrackerOutput::Error(err)]
    }

    /// Dead-reckon between fixes and fuse every fresh heading source.
    pub fn tick(&mut self, now: f64) -> Vec<TrackerOutput> {
        let mut outputs = Vec::new();
        if !self.is_running() {
            return outputs;
        }

        self.state.handle(TrackingEvent::Tick { now });

        if let Some(last_fix) = self.state.last_fix_at() {
            let silence = now - last_fix;
            let predicted = if silence > self.max_prediction_secs {
                None
            } else {
                self.dead_reckoning.predict(self.position.history(), now)
            };

            match predicted {
                Some(predicted) => {
                    let update = PositionUpdate {
                        latitude: predicted.latitude,
                        longitude: predicted.longitude,
                        altitude: self.position.current().and_then(|p| p.altitude),
                        accuracy: predicted.accuracy,
                        velocity: self.velocity,
                        meta: self.next_meta(false, now),
                    };
                    self.last_position = Some(update.clone());
                    outputs.push(TrackerOutput::Position(update));
                }
                // Degraded with nothing to dead-reckon from, or past the prediction cap
                None if self.state() == TrackingState::Degraded && !self.stale_reported => {
                    self.stale_reported = true;
                    let err = TrackerError::PositionStale { seconds: silence };
                    log::warn!("{err}");
                    self.counters.errors_reported += 1;
                    outputs.push(TrackerOutput::Error(err));
                }
                None => {}
            }
        }

        let sources = self.heading_sources(now);
        match self.fusion.fuse(&sources, now) {
            Ok(result) => {
                self.counters.headings_fused += 1;
                self.last_heading = Some(result.clone());
                outputs.push(TrackerOutput::Heading(result));
            }
            Err(err) => log::debug!("no fused heading at t={now:.2}: {err}"),
        }

        outputs
    }

    /// Every heading opinion currently available, with configured base weights.
    pub fn heading_sources(&self, now: f64) -> Vec<HeadingSource> {
        let cfg = &self.sources_config;
        let mut sources = Vec::with_capacity(5);

        if let Some(device) = self.device_heading {
            let age = now - device.timestamp;
            if age <= cfg.device_max_age_secs {
                sources.push(self.fusion.source(SourceTag::Device, device.heading, device.confidence));
            }
        }

        // Sky estimates describe the last real fix and lapse with it
        if self.state() == TrackingState::Tracking {
            if let Some(est) = self.satellite_estimate {
                sources.push(self.fusion.source(SourceTag::Satellite, est.heading, est.confidence));
            }
            if let Some(est) = self.trajectory_estimate {
                sources.push(self.fusion.source(SourceTag::Trajectory, est.heading, est.confidence));
            }
        }

        if self.motion_seen && self.inertial.has_heading() {
            let confidence = if self.inertial.is_calibrated() {
                cfg.inertial_calibrated_confidence
            } else {
                cfg.inertial_uncalibrated_confidence
            };
            sources.push(self.fusion.source(SourceTag::Inertial, self.inertial.heading(), confidence));
        }

        // Movement describes the last real fix and lapses with it
        let movement_fresh = self
            .state
            .last_fix_at()
            .map(|t| now - t <= cfg.movement_max_age_secs)
            .unwrap_or(false);
        let movement = self
            .velocity
            .and_then(|v| v.heading.map(|h| (h, v.speed)))
            .or_else(|| {
                self.provider_course
                    .filter(|c| c.speed > cfg.course_min_speed)
                    .map(|c| (c.heading, c.speed))
            })
            .filter(|_| movement_fresh);
        if let Some((heading, speed)) = movement {
            let confidence = (speed / cfg.movement_full_confidence_speed).min(1.0);
            sources.push(self.fusion.source(SourceTag::Movement, heading, confidence));
        }

        sources
    }

    pub fn last_position(&self) -> Option<&PositionUpdate> {
        self.last_position.as_ref()
    }

    pub fn last_heading(&self) -> Option<&FusionResult> {
        self.last_heading.as_ref()
    }

    pub fn geometry_quality(&self) -> Option<&GeometryQuality> {
        self.quality.as_ref()
    }

    pub fn inertial(&self) -> &InertialOrientationFilter {
        &self.inertial
    }

    pub fn status(&self, now: f64) -> TrackerStatus {
        let mut status = TrackerStatus::new(self.state());
        status.timestamp = now;
        status.fixes_accepted = self.position.accepted_count();
        status.fixes_rejected = self.position.rejected_count();
        status.position_updates = self.counters.position_updates;
        status.headings_fused = self.counters.headings_fused;
        status.errors_reported = self.counters.errors_reported;
        status.seconds_since_fix = self.state.last_fix_at().map(|t| now - t);
        if let Some(position) = &self.last_position {
            status.apply_position(position);
        }
        if let Some(heading) = &self.last_heading {
            status.apply_heading(heading);
        }
        status.apply_quality(self.quality.as_ref());
        status.inertial_calibrated = self.inertial.is_calibrated();
        status.inertial_aligned = self.inertial.is_aligned();
        status.tilt_deg = self.inertial.tilt_deg();
        status
    }

    fn next_meta(&mut self, is_real_fix: bool, timestamp: f64) -> PositionMeta {
        self.counters.position_updates += 1;
        PositionMeta {
            update_count: self.counters.position_updates,
            is_real_fix,
            predicted: !is_real_fix,
            timestamp,
        }
    }

    fn refresh_sky(&mut self, position: &SmoothedPosition) {
        let observer = Observer {
            latitude: position.latitude,
            longitude: position.longitude,
            altitude: position.altitude.unwrap_or(0.0),
        };
        let observations = self.geometry.observe(&observer, position.timestamp);
        self.quality = GeometryQuality::assess(&observations);

        self.satellite_estimate = match self.triangulator.triangulate(&observations) {
            Ok(est) => Some(est),
            Err(err) => {
                log::debug!("triangulated heading unavailable: {err}");
                None
            }
        };

        self.sky_history.push(SatelliteSnapshot {
            timestamp: position.timestamp,
            observations,
        });
        self.trajectory_estimate = match self.trajectory.predict_from_history(&self.sky_history) {
            Ok(est) => Some(est),
            Err(err) => {
                log::debug!("trajectory heading unavailable: {err}");
                None
            }
        };
    }
}
