//! Coarse sky-quality score.
//!
//! This is not a dilution-of-precision computation: it has no design matrix.
//! It only rewards more satellites and a wider elevation spread, which is
//! enough to rank one synthetic sky against another.

use serde::{Deserialize, Serialize};

use crate::satellites::geometry::SatelliteObservation;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeometryQuality {
    pub visible: usize,
    /// Highest minus lowest elevation (deg)
    pub elevation_spread_deg: f64,
    /// `(4/√n)·(1 + (1 − spread/90))`, lower is better
    pub pdop_like: f64,
}

impl GeometryQuality {
    /// `None` when nothing is visible.
    pub fn assess(observations: &[SatelliteObservation]) -> Option<Self> {
        if observations.is_empty() {
            return None;
        }

        let (min_el, max_el) = observations
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), obs| {
                (lo.min(obs.elevation), hi.max(obs.elevation))
            });
        let spread = (max_el - min_el).clamp(0.0, 90.0);
        let n = observations.len();

        Some(Self {
            visible: n,
            elevation_spread_deg: spread,
            pdop_like: (4.0 / (n as f64).sqrt()) * (1.0 + (1.0 - spread / 90.0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::satellites::constellation::{Constellation, SatelliteId};
    use approx::assert_relative_eq;

    fn obs(number: u8, elevation: f64) -> SatelliteObservation {
        SatelliteObservation {
            id: SatelliteId {
                constellation: Constellation::Synthetic,
                number,
            },
            azimuth: number as f64 * 40.0,
            elevation,
            range_km: 21_000.0,
            signal_strength: 0.8,
        }
    }

    #[test]
    fn test_empty_sky() {
        assert!(GeometryQuality::assess(&[]).is_none());
    }

    #[test]
    fn test_spread_improves_score() {
        let clustered: Vec<_> = (0..4).map(|i| obs(i, 40.0 + i as f64)).collect();
        let spread: Vec<_> = (0..4).map(|i| obs(i, 10.0 + 25.0 * i as f64)).collect();

        let a = GeometryQuality::assess(&clustered).unwrap();
        let b = GeometryQuality::assess(&spread).unwrap();
        assert!(b.pdop_like < a.pdop_like);
        assert_relative_eq!(b.elevation_spread_deg, 75.0);
    }

    #[test]
    fn test_known_values() {
        let sky: Vec<_> = (0..16).map(|i| obs(i, if i % 2 == 0 { 10.0 } else { 100.0 })).collect();
        let q = GeometryQuality::assess(&sky).unwrap();
        assert_eq!(q.visible, 16);
        // spread capped at 90
        assert_relative_eq!(q.pdop_like, 1.0);
    }
}
