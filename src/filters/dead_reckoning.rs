use serde::{Deserialize, Serialize};

use crate::filters::movement::{offset_position, MovementEstimator};
use crate::types::{History, PositionSnapshot};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadReckoningConfig {
    /// A real fix younger than this is still fresh; nothing is predicted
    pub min_elapsed_secs: f64,
    /// Predictions stop once the last real fix is older than this
    pub max_prediction_secs: f64,
}

impl Default for DeadReckoningConfig {
    fn default() -> Self {
        Self {
            min_elapsed_secs: 0.1,
            max_prediction_secs: 30.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictedPosition {
    pub latitude: f64,
    pub longitude: f64,
    /// Degraded accuracy, `last_accuracy * (1 + dt)`
    pub accuracy: f64,
    pub timestamp: f64,
    /// Seconds extrapolated past the last real fix
    pub horizon: f64,
}

/// Extrapolates between fixes from the last velocity seen in the history.
pub struct DeadReckoningPredictor {
    config: DeadReckoningConfig,
}

impl DeadReckoningPredictor {
    pub fn new(config: DeadReckoningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DeadReckoningConfig {
        &self.config
    }

    /// `predicted = last + v * dt` where `v` comes from the two newest snapshots.
    ///
    /// Fails closed (`None`) with under two snapshots, a fresh fix,
    /// `dt <= 0`, or a horizon past `max_prediction_secs`.
    pub fn predict(&self, history: &History<PositionSnapshot>, now: f64) -> Option<PredictedPosition> {
        let last = history.get_back(0)?;
        let previous = history.get_back(1)?;

        let dt = now - last.timestamp;
        if !dt.is_finite() || dt <= 0.0 || dt < self.config.min_elapsed_secs {
            return None;
        }
        if dt > self.config.max_prediction_secs {
            return None;
        }

        let (v_east, v_north) = MovementEstimator::velocity_en(previous, last)?;
        let (latitude, longitude) =
            offset_position(last.latitude, last.longitude, v_east * dt, v_north * dt);
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }

        Some(PredictedPosition {
            latitude,
            longitude,
            accuracy: last.accuracy * (1.0 + dt),
            timestamp: now,
            horizon: dt,
        })
    }
}

impl Default for DeadReckoningPredictor {
    fn default() -> Self {
        Self::new(DeadReckoningConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::movement::local_offset_m;
    use approx::assert_relative_eq;

    fn history_of(points: &[(f64, f64, f64)]) -> History<PositionSnapshot> {
        let mut history = History::new(20);
        for &(t, lat, lon) in points {
            history.push(PositionSnapshot {
                latitude: lat,
                longitude: lon,
                accuracy: 5.0,
                timestamp: t,
            });
        }
        history
    }

    #[test]
    fn test_needs_two_points() {
        let predictor = DeadReckoningPredictor::default();
        assert!(predictor.predict(&History::new(20), 1.0).is_none());
        assert!(predictor.predict(&history_of(&[(0.0, 1.0, 1.0)]), 1.0).is_none());
    }

    #[test]
    fn test_fresh_fix_suppresses_prediction() {
        let predictor = DeadReckoningPredictor::default();
        let history = history_of(&[(0.0, 1.0, 1.0), (1.0, 1.0001, 1.0)]);
        assert!(predictor.predict(&history, 1.0).is_none());
        assert!(predictor.predict(&history, 1.05).is_none());
        assert!(predictor.predict(&history, 0.5).is_none());
        assert!(predictor.predict(&history, 1.1).is_some());
    }

    #[test]
    fn test_zero_velocity_holds_position() {
        let predictor = DeadReckoningPredictor::default();
        let history = history_of(&[(0.0, 48.85, 2.35), (1.0, 48.85, 2.35)]);
        let p = predictor.predict(&history, 3.0).unwrap();
        assert_eq!(p.latitude, 48.85);
        assert_eq!(p.longitude, 2.35);
        assert!(p.accuracy >= 5.0);
        assert_relative_eq!(p.accuracy, 15.0);
    }

    #[test]
    fn test_extrapolates_along_velocity() {
        let predictor = DeadReckoningPredictor::default();
        // 0.0001 deg north per second ~ 11.1 m/s
        let history = history_of(&[(0.0, 10.0, 20.0), (1.0, 10.0001, 20.0)]);
        let p = predictor.predict(&history, 3.0).unwrap();

        let (east, north) = local_offset_m(10.0001, 20.0, p.latitude, p.longitude);
        assert_relative_eq!(north, 2.0 * 11.132, epsilon = 1e-6);
        assert!(east.abs() < 1e-6);
        assert_relative_eq!(p.horizon, 2.0);
        assert_eq!(p.timestamp, 3.0);
    }

    #[test]
    fn test_horizon_limit() {
        let predictor = DeadReckoningPredictor::new(DeadReckoningConfig {
            min_elapsed_secs: 0.1,
            max_prediction_secs: 5.0,
        });
        let history = history_of(&[(0.0, 1.0, 1.0), (1.0, 1.0, 1.0)]);
        assert!(predictor.predict(&history, 6.0).is_some());
        assert!(predictor.predict(&history, 6.5).is_none());
    }

    #[test]
    fn test_duplicate_timestamps_fail_closed() {
        let predictor = DeadReckoningPredictor::default();
        let history = history_of(&[(1.0, 1.0, 1.0), (1.0, 1.0001, 1.0)]);
        assert!(predictor.predict(&history, 2.0).is_none());
    }
}
