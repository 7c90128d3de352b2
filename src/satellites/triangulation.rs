use serde::{Deserialize, Serialize};

use crate::angles::{separation, weighted_circular_mean};
use crate::error::{TrackerError, TrackerResult};
use crate::satellites::geometry::SatelliteObservation;
use crate::types::HeadingEstimate;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    /// Satellites at or below this elevation are not used (deg)
    pub min_elevation_deg: f64,
    pub min_signal: f64,
    pub min_satellites: usize,
    /// Nearest-neighbour distance giving half isolation weight (deg)
    pub isolation_scale_deg: f64,
    pub isolation_floor: f64,
    /// Mean resultant length under which the azimuths carry no direction
    pub min_resultant: f64,
    /// Satellite count at which confidence stops growing
    pub full_confidence_count: usize,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            min_elevation_deg: 15.0,
            min_signal: 0.3,
            min_satellites: 4,
            isolation_scale_deg: 20.0,
            isolation_floor: 0.05,
            min_resultant: 0.1,
            full_confidence_count: 8,
        }
    }
}

/// Position of one satellite on the sky plus its signal, the unit both
/// heading estimators weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SkyPoint {
    pub azimuth: f64,
    pub elevation: f64,
    pub signal: f64,
}

impl From<&SatelliteObservation> for SkyPoint {
    fn from(obs: &SatelliteObservation) -> Self {
        SkyPoint {
            azimuth: obs.azimuth,
            elevation: obs.elevation,
            signal: obs.signal_strength,
        }
    }
}

/// Isolation of each point: `d / (d + scale)` of its nearest neighbour
/// distance in (wrapped azimuth, elevation), floored.
pub(crate) fn isolation_weights(points: &[SkyPoint], scale: f64, floor: f64) -> Vec<f64> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let nearest = points
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, q)| {
                    separation(p.azimuth, q.azimuth).hypot(p.elevation - q.elevation)
                })
                .fold(f64::INFINITY, f64::min);

            if nearest.is_infinite() {
                1.0
            } else {
                (nearest / (nearest + scale)).max(floor)
            }
        })
        .collect()
}

/// Weighted circular mean of azimuths with `signal × isolation` weights.
pub(crate) fn azimuth_heading(points: &[SkyPoint], config: &TriangulationConfig) -> TrackerResult<HeadingEstimate> {
    if points.len() < config.min_satellites {
        return Err(TrackerError::DegenerateGeometry {
            usable: points.len(),
            required: config.min_satellites,
        });
    }

    let isolation = isolation_weights(points, config.isolation_scale_deg, config.isolation_floor);
    let mean = weighted_circular_mean(
        points
            .iter()
            .zip(&isolation)
            .map(|(p, iso)| (p.azimuth, p.signal * iso)),
    )
    .ok_or(TrackerError::DegenerateGeometry {
        usable: 0,
        required: config.min_satellites,
    })?;

    if mean.resultant_length < config.min_resultant {
        log::debug!(
            "azimuths cancel out (R={:.3}, n={})",
            mean.resultant_length,
            points.len()
        );
        return Err(TrackerError::DegenerateGeometry {
            usable: points.len(),
            required: config.min_satellites,
        });
    }

    let coverage = (points.len() as f64 / config.full_confidence_count.max(1) as f64).min(1.0);
    Ok(HeadingEstimate {
        heading: mean.mean,
        confidence: (mean.resultant_length * coverage).clamp(0.0, 1.0),
        contributors: points.len(),
    })
}

/// Heading from the instantaneous distribution of satellite azimuths.
pub struct GeometricHeadingTriangulator {
    config: TriangulationConfig,
}

impl GeometricHeadingTriangulator {
    pub fn new(config: TriangulationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TriangulationConfig {
        &self.config
    }

    pub fn triangulate(&self, observations: &[SatelliteObservation]) -> TrackerResult<HeadingEstimate> {
        let good: Vec<SkyPoint> = observations
            .iter()
            .filter(|obs| {
                obs.elevation > self.config.min_elevation_deg
                    && obs.signal_strength > self.config.min_signal
                    && obs.azimuth.is_finite()
            })
            .map(SkyPoint::from)
            .collect();

        azimuth_heading(&good, &self.config)
    }
}

impl Default for GeometricHeadingTriangulator {
    fn default() -> Self {
        Self::new(TriangulationConfig::default())
    }
}
