use serde::{Deserialize, Serialize};

use crate::error::{TrackerError, TrackerResult};
use crate::types::{History, PositionSnapshot, RawFix, SmoothedPosition};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionFilterConfig {
    /// Numerator of the accuracy-driven smoothing factor `k / accuracy`
    pub gain: f64,
    /// Upper bound on how far a single fix can pull the estimate
    pub max_factor: f64,
    /// Stand-in accuracy (m) for fixes reporting a non-positive or non-finite radius
    pub fallback_accuracy: f64,
    pub history_capacity: usize,
}

impl Default for PositionFilterConfig {
    fn default() -> Self {
        Self {
            gain: 8.0,
            max_factor: 0.4,
            fallback_accuracy: 50.0,
            history_capacity: 20,
        }
    }
}

/// Exponential smoothing of raw fixes, weighted by reported accuracy.
///
/// Better fixes (smaller accuracy radius) get a larger blend factor and pull
/// the estimate toward the raw value faster.
pub struct PositionFilter {
    config: PositionFilterConfig,
    current: Option<SmoothedPosition>,
    history: History<PositionSnapshot>,
    accepted: u64,
    rejected: u64,
}

impl PositionFilter {
    pub fn new(config: PositionFilterConfig) -> Self {
        let history = History::new(config.history_capacity);
        Self {
            config,
            current: None,
            history,
            accepted: 0,
            rejected: 0,
        }
    }

    /// `clamp(k / max(accuracy, 1), 0, max_factor)`
    pub fn smoothing_factor(&self, accuracy: f64) -> f64 {
        let accuracy = self.sanitize_accuracy(accuracy);
        (self.config.gain / accuracy.max(1.0)).clamp(0.0, self.config.max_factor)
    }

    fn sanitize_accuracy(&self, accuracy: f64) -> f64 {
        if accuracy.is_finite() && accuracy > 0.0 {
            accuracy
        } else {
            self.config.fallback_accuracy
        }
    }

    /// Blend a raw fix into the estimate.
    ///
    /// Rejected fixes leave the filter untouched and return
    /// [`TrackerError::InvalidSample`]; callers fall back to [`Self::current`].
    pub fn update(&mut self, fix: &RawFix) -> TrackerResult<SmoothedPosition> {
        if !fix.has_valid_coordinates() || !fix.timestamp.is_finite() {
            self.rejected += 1;
            return Err(TrackerError::InvalidSample(format!(
                "fix at t={} has lat={} lon={}",
                fix.timestamp, fix.latitude, fix.longitude
            )));
        }

        let accuracy = self.sanitize_accuracy(fix.accuracy);
        let raw = SmoothedPosition {
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude: fix.altitude.filter(|a| a.is_finite()),
            accuracy,
            timestamp: fix.timestamp,
        };

        let smoothed = match &self.current {
            None => raw,
            Some(prev) => {
                let f = self.smoothing_factor(accuracy);
                let blend = |old: f64, new: f64| old * (1.0 - f) + new * f;

                let altitude = match (prev.altitude, raw.altitude) {
                    (Some(old), Some(new)) => Some(blend(old, new)),
                    (_, new) => new,
                };
                let candidate = SmoothedPosition {
                    latitude: blend(prev.latitude, raw.latitude),
                    longitude: blend(prev.longitude, raw.longitude),
                    altitude,
                    accuracy: blend(prev.accuracy, raw.accuracy),
                    timestamp: raw.timestamp,
                };

                if candidate.latitude.is_finite()
                    && candidate.longitude.is_finite()
                    && candidate.accuracy.is_finite()
                {
                    candidate
                } else {
                    log::warn!(
                        "position blend produced non-finite output at t={:.3}, using raw fix",
                        fix.timestamp
                    );
                    raw
                }
            }
        };

        self.history.push(PositionSnapshot::from(&smoothed));
        self.current = Some(smoothed.clone());
        self.accepted += 1;
        Ok(smoothed)
    }

    pub fn current(&self) -> Option<&SmoothedPosition> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &History<PositionSnapshot> {
        &self.history
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.history.clear();
    }
}

impl Default for PositionFilter {
    fn default() -> Self {
        Self::new(PositionFilterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_fix_passes_through() {
        let mut filter = PositionFilter::default();
        let out = filter.update(&RawFix::new(0.0, 51.5007, -0.1246, 5.0)).unwrap();
        assert_eq!(out.latitude, 51.5007);
        assert_eq!(out.longitude, -0.1246);
        assert_eq!(filter.history().len(), 1);
    }

    #[test]
    fn test_smoothing_factor_prefers_accurate_fixes() {
        let filter = PositionFilter::new(PositionFilterConfig {
            gain: 8.0,
            max_factor: 0.4,
            ..Default::default()
        });
        assert_relative_eq!(filter.smoothing_factor(4.0), 0.4);
        assert_relative_eq!(filter.smoothing_factor(40.0), 0.2);
        assert_relative_eq!(filter.smoothing_factor(80.0), 0.1);
        assert!(filter.smoothing_factor(10.0) > filter.smoothing_factor(30.0));
        // Bad accuracy falls back to the configured radius
        assert_relative_eq!(filter.smoothing_factor(f64::NAN), 8.0 / 50.0);
        assert_relative_eq!(filter.smoothing_factor(-3.0), 8.0 / 50.0);
    }

    #[test]
    fn test_blend_lands_between_raw_values() {
        let mut filter = PositionFilter::default();
        filter.update(&RawFix::new(0.0, 51.5007, -0.1246, 5.0)).unwrap();
        let out = filter.update(&RawFix::new(1.0, 51.5008, -0.1245, 4.0)).unwrap();

        assert!(out.latitude > 51.5007 && out.latitude < 51.5008);
        assert!(out.longitude > -0.1246 && out.longitude < -0.1245);
        assert_relative_eq!(out.latitude, 51.5007 + 0.4 * 0.0001, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_fix_is_rejected_without_touching_state() {
        let mut filter = PositionFilter::default();
        let good = filter.update(&RawFix::new(0.0, 10.0, 20.0, 5.0)).unwrap();

        let err = filter.update(&RawFix::new(1.0, f64::NAN, 20.0, 5.0)).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidSample(_)));
        assert_eq!(filter.current(), Some(&good));
        assert_eq!(filter.history().len(), 1);
        assert_eq!(filter.rejected_count(), 1);
    }

    #[test]
    fn test_invalid_first_fix_leaves_no_estimate() {
        let mut filter = PositionFilter::default();
        assert!(filter
            .update(&RawFix::new(0.0, 10.0, f64::INFINITY, 5.0))
            .is_err());
        assert!(filter.current().is_none());
    }

    #[test]
    fn test_output_always_finite_with_malformed_interleaving() {
        let mut filter = PositionFilter::default();
        let inputs = [
            RawFix::new(0.0, 45.0, 7.0, 5.0),
            RawFix::new(1.0, f64::NAN, 7.0, 5.0),
            RawFix::new(2.0, 45.0001, 7.0001, 0.0),
            RawFix::new(3.0, 45.0, f64::NEG_INFINITY, 3.0),
            RawFix::new(4.0, 45.0002, 7.0002, f64::INFINITY),
            RawFix::new(5.0, 45.0003, 7.0003, f64::NAN),
            RawFix::new(f64::NAN, 45.0003, 7.0003, 4.0),
            RawFix::new(6.0, 45.0004, 7.0004, 1e-9),
        ];

        for fix in &inputs {
            let _ = filter.update(fix);
            let current = filter.current().unwrap();
            assert!(current.latitude.is_finite());
            assert!(current.longitude.is_finite());
            assert!(current.accuracy.is_finite() && current.accuracy > 0.0);
        }
        assert_eq!(filter.rejected_count(), 3);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut filter = PositionFilter::new(PositionFilterConfig {
            history_capacity: 5,
            ..Default::default()
        });
        for i in 0..50 {
            filter
                .update(&RawFix::new(i as f64, 1.0 + i as f64 * 1e-5, 2.0, 5.0))
                .unwrap();
        }
        assert_eq!(filter.history().len(), 5);
        assert_eq!(filter.history().oldest().unwrap().timestamp, 45.0);
        assert_eq!(filter.history().latest().unwrap().timestamp, 49.0);
    }

    #[test]
    fn test_altitude_blending() {
        let mut filter = PositionFilter::default();
        filter
            .update(&RawFix::new(0.0, 1.0, 1.0, 5.0).with_altitude(100.0, None))
            .unwrap();
        let out = filter
            .update(&RawFix::new(1.0, 1.0, 1.0, 5.0).with_altitude(110.0, None))
            .unwrap();
        assert_relative_eq!(out.altitude.unwrap(), 104.0, epsilon = 1e-9);

        let out = filter.update(&RawFix::new(2.0, 1.0, 1.0, 5.0)).unwrap();
        assert_eq!(out.altitude, None);
    }
}
