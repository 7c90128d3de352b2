use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::angles::{normalize_deg, shortest_delta};
use crate::error::{TrackerError, TrackerResult};
use crate::satellites::constellation::SatelliteId;
use crate::satellites::geometry::SatelliteSnapshot;
use crate::satellites::triangulation::{azimuth_heading, SkyPoint, TriangulationConfig};
use crate::types::{HeadingEstimate, History};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    /// How far ahead satellite motion is extrapolated (s)
    pub horizon_secs: f64,
    /// Preferred minimum age of the baseline snapshot (s)
    pub min_baseline_secs: f64,
    /// Predicted positions below this elevation are discarded (deg)
    pub elevation_mask_deg: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            horizon_secs: 10.0,
            min_baseline_secs: 1.0,
            elevation_mask_deg: 10.0,
        }
    }
}

/// Heading from where the visible satellites will be a few seconds from now.
pub struct TrajectoryHeadingPredictor {
    config: TrajectoryConfig,
    weighting: TriangulationConfig,
}

impl TrajectoryHeadingPredictor {
    pub fn new(config: TrajectoryConfig, weighting: TriangulationConfig) -> Self {
        Self { config, weighting }
    }

    /// Predict from the newest snapshot and a baseline picked from `history`.
    pub fn predict_from_history(&self, history: &History<SatelliteSnapshot>) -> TrackerResult<HeadingEstimate> {
        let required = self.weighting.min_satellites;
        let current = history
            .latest()
            .ok_or(TrackerError::DegenerateGeometry { usable: 0, required })?;

        let cutoff = current.timestamp - self.config.min_baseline_secs;
        let baseline = history
            .iter()
            .rev()
            .find(|snap| snap.timestamp <= cutoff)
            .or_else(|| history.oldest())
            .ok_or(TrackerError::DegenerateGeometry { usable: 0, required })?;

        self.predict(baseline, current)
    }

    /// Extrapolate each satellite seen in both snapshots `horizon_secs` past
    /// `current` and take the weighted azimuth mean of the survivors.
    pub fn predict(&self, previous: &SatelliteSnapshot, current: &SatelliteSnapshot) -> TrackerResult<HeadingEstimate> {
        let required = self.weighting.min_satellites;
        let dt = current.timestamp - previous.timestamp;
        if !dt.is_finite() || dt <= 0.0 {
            return Err(TrackerError::DegenerateGeometry { usable: 0, required });
        }

        let before: HashMap<SatelliteId, _> = previous.observations.iter().map(|obs| (obs.id, obs)).collect();
        let horizon = self.config.horizon_secs;

        let predicted: Vec<SkyPoint> = current
            .observations
            .iter()
            .filter_map(|now| {
                let then = before.get(&now.id)?;
                let az_rate = shortest_delta(then.azimuth, now.azimuth) / dt;
                let el_rate = (now.elevation - then.elevation) / dt;

                let elevation = (now.elevation + el_rate * horizon).min(90.0);
                if !elevation.is_finite() || elevation < self.config.elevation_mask_deg {
                    return None;
                }
                Some(SkyPoint {
                    azimuth: normalize_deg(now.azimuth + az_rate * horizon),
                    elevation,
                    signal: now.signal_strength,
                })
            })
            .collect();

        azimuth_heading(&predicted, &self.weighting)
    }
}

impl Default for TrajectoryHeadingPredictor {
    fn default() -> Self {
        Self::new(TrajectoryConfig::default(), TriangulationConfig::default())
    }
}
