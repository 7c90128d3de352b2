//! Synthetic sky model.
//!
//! Propagates each constellation slot as a two-body Keplerian orbit from a
//! fixed epoch, rotates it into the Earth-fixed frame and reports what an
//! observer would see. Everything here is a pure function of its inputs so
//! snapshots taken at different times can be compared directly.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::angles::normalize_deg;
use crate::satellites::constellation::{ConstellationParams, SatelliteId, EARTH_RADIUS_KM};

/// 2000-01-01T12:00:00Z as Unix seconds
pub const J2000_UNIX_SECS: f64 = 946_728_000.0;

const WGS84_FLATTENING: f64 = 1.0 / 298.257_223_563;
const KEPLER_TOLERANCE: f64 = 1e-6;
const KEPLER_MAX_ITERATIONS: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observer {
    pub latitude: f64,
    pub longitude: f64,
    /// meters above the ellipsoid
    pub altitude: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SatelliteObservation {
    pub id: SatelliteId,
    /// [0, 360), clockwise from north
    pub azimuth: f64,
    pub elevation: f64,
    /// Slant range (km)
    pub range_km: f64,
    /// [0, 1]
    pub signal_strength: f64,
}

/// All observations computed for one instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SatelliteSnapshot {
    pub timestamp: f64,
    pub observations: Vec<SatelliteObservation>,
}

/// Anything able to produce a sky for an observer at a given time.
pub trait GeometrySource: Send {
    fn observe(&self, observer: &Observer, timestamp: f64) -> Vec<SatelliteObservation>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SatelliteConfig {
    pub constellations: Vec<ConstellationParams>,
    /// Observations below this elevation are not visible (deg)
    pub elevation_mask_deg: f64,
    pub epoch_unix_secs: f64,
    /// Snapshots kept for trajectory prediction
    pub history_capacity: usize,
}

impl Default for SatelliteConfig {
    fn default() -> Self {
        Self {
            constellations: ConstellationParams::nominal_table(),
            elevation_mask_deg: 10.0,
            epoch_unix_secs: J2000_UNIX_SECS,
            history_capacity: 30,
        }
    }
}

/// Solve `E - e·sin(E) = M` by Newton-Raphson.
///
/// Returns the eccentric anomaly and whether it converged; on failure the
/// mean anomaly itself is returned.
pub fn solve_kepler(mean_anomaly: f64, eccentricity: f64) -> (f64, bool) {
    solve_kepler_with(mean_anomaly, eccentricity, KEPLER_TOLERANCE, KEPLER_MAX_ITERATIONS)
}

pub fn solve_kepler_with(m: f64, e: f64, tolerance: f64, max_iterations: usize) -> (f64, bool) {
    let mut ecc_anomaly = if e < 0.8 { m } else { std::f64::consts::PI };
    for _ in 0..max_iterations {
        let f = ecc_anomaly - e * ecc_anomaly.sin() - m;
        let f_prime = 1.0 - e * ecc_anomaly.cos();
        if f_prime.abs() < 1e-12 {
            break;
        }
        let step = f / f_prime;
        ecc_anomaly -= step;
        if step.abs() < tolerance {
            return (ecc_anomaly, true);
        }
    }
    (m, false)
}

/// Greenwich Mean Sidereal Time (rad) for a Unix timestamp.
pub fn gmst_rad(unix_secs: f64) -> f64 {
    let days_since_j2000 = (unix_secs - J2000_UNIX_SECS) / 86_400.0;
    let gmst_deg = 280.460_618_37 + 360.985_647_366_29 * days_since_j2000;
    normalize_deg(gmst_deg).to_radians()
}

/// Geodetic (deg, deg, m) to Earth-fixed Cartesian (km) on WGS84.
pub fn geodetic_to_ecef(lat_deg: f64, lon_deg: f64, alt_m: f64) -> Vector3<f64> {
    let (lat, lon) = (lat_deg.to_radians(), lon_deg.to_radians());
    let e2 = WGS84_FLATTENING * (2.0 - WGS84_FLATTENING);
    let n = EARTH_RADIUS_KM / (1.0 - e2 * lat.sin().powi(2)).sqrt();
    let alt_km = alt_m / 1000.0;

    Vector3::new(
        (n + alt_km) * lat.cos() * lon.cos(),
        (n + alt_km) * lat.cos() * lon.sin(),
        (n * (1.0 - e2) + alt_km) * lat.sin(),
    )
}

/// Azimuth (deg), elevation (deg) and range (km) of `target` seen from an
/// observer, through the local North-East-Up frame.
pub fn look_angles(observer: &Observer, target_ecef: &Vector3<f64>) -> (f64, f64, f64) {
    let origin = geodetic_to_ecef(observer.latitude, observer.longitude, observer.altitude);
    let d = target_ecef - origin;
    let (lat, lon) = (observer.latitude.to_radians(), observer.longitude.to_radians());

    let north = -lat.sin() * lon.cos() * d.x - lat.sin() * lon.sin() * d.y + lat.cos() * d.z;
    let east = -lon.sin() * d.x + lon.cos() * d.y;
    let up = lat.cos() * lon.cos() * d.x + lat.cos() * lon.sin() * d.y + lat.sin() * d.z;

    let range = d.norm();
    let azimuth = normalize_deg(east.atan2(north).to_degrees());
    let elevation = up.atan2(north.hypot(east)).to_degrees();
    (azimuth, elevation, range)
}

/// Heuristic signal score: atmospheric path (worse near the horizon) plus
/// free-space loss relative to the overhead range.
pub fn signal_strength(elevation_deg: f64, range_km: f64, orbit_altitude_km: f64) -> f64 {
    let atmospheric = elevation_deg.to_radians().sin().max(0.0).sqrt();
    let range_term = if range_km > 0.0 {
        (orbit_altitude_km / range_km).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (0.7 * atmospheric + 0.3 * range_term).clamp(0.0, 1.0)
}

/// Keplerian propagation of the configured constellation table.
#[derive(Clone, Debug)]
pub struct SyntheticConstellationModel {
    constellations: Vec<ConstellationParams>,
    elevation_mask_deg: f64,
    epoch_unix_secs: f64,
}

impl SyntheticConstellationModel {
    pub fn new(config: &SatelliteConfig) -> Self {
        Self {
            constellations: config.constellations.clone(),
            elevation_mask_deg: config.elevation_mask_deg,
            epoch_unix_secs: config.epoch_unix_secs,
        }
    }

    /// Earth-fixed position (km) of one slot at `unix_secs`.
    pub fn satellite_ecef(&self, params: &ConstellationParams, plane: u8, slot: u8, unix_secs: f64) -> Vector3<f64> {
        let mean_motion = TAU / params.period_secs;
        let elapsed = unix_secs - self.epoch_unix_secs;
        let m0 = params.initial_mean_anomaly_deg(plane, slot).to_radians();
        let mean_anomaly = (m0 + mean_motion * elapsed).rem_euclid(TAU);

        let e = params.eccentricity;
        let (ecc_anomaly, converged) = solve_kepler(mean_anomaly, e);
        if !converged {
            log::debug!(
                "kepler did not converge for {} (M={mean_anomaly:.4}, e={e})",
                params.satellite_id(plane, slot)
            );
        }

        let true_anomaly = 2.0
            * ((1.0 + e).sqrt() * (ecc_anomaly / 2.0).sin())
                .atan2((1.0 - e).sqrt() * (ecc_anomaly / 2.0).cos());
        let radius = params.semi_major_axis_km * (1.0 - e * ecc_anomaly.cos());

        // Perigee on the ascending node
        let x_orb = radius * true_anomaly.cos();
        let y_orb = radius * true_anomaly.sin();

        let raan = params.raan_deg(plane).to_radians();
        let incl = params.inclination_deg.to_radians();
        let eci = Vector3::new(
            x_orb * raan.cos() - y_orb * incl.cos() * raan.sin(),
            x_orb * raan.sin() + y_orb * incl.cos() * raan.cos(),
            y_orb * incl.sin(),
        );

        let theta = gmst_rad(unix_secs);
        Vector3::new(
            eci.x * theta.cos() + eci.y * theta.sin(),
            -eci.x * theta.sin() + eci.y * theta.cos(),
            eci.z,
        )
    }
}

impl GeometrySource for SyntheticConstellationModel {
    fn observe(&self, observer: &Observer, timestamp: f64) -> Vec<SatelliteObservation> {
        let mut observations = Vec::new();
        if !observer.latitude.is_finite() || !observer.longitude.is_finite() || !timestamp.is_finite() {
            return observations;
        }

        for params in &self.constellations {
            for plane in 0..params.planes {
                for slot in 0..params.satellites_per_plane() {
                    let ecef = self.satellite_ecef(params, plane, slot, timestamp);
                    let (azimuth, elevation, range_km) = look_angles(observer, &ecef);
                    if elevation < self.elevation_mask_deg {
                        continue;
                    }
                    observations.push(SatelliteObservation {
                        id: params.satellite_id(plane, slot),
                        azimuth,
                        elevation,
                        range_km,
                        signal_strength: signal_strength(elevation, range_km, params.altitude_km()),
                    });
                }
            }
        }

        observations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const LONDON: Observer = Observer {
        latitude: 51.5007,
        longitude: -0.1246,
        altitude: 20.0,
    };

    #[test]
    fn test_kepler_circular_orbit() {
        let (e_anom, converged) = solve_kepler(1.234, 0.0);
        assert!(converged);
        assert_relative_eq!(e_anom, 1.234, epsilon = 1e-9);
    }

    #[test]
    fn test_kepler_eccentric_orbit() {
        let (e_anom, converged) = solve_kepler(1.0, 0.5);
        assert!(converged);
        assert!((e_anom - 0.5 * e_anom.sin() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_kepler_fallback_to_mean_anomaly() {
        let (e_anom, converged) = solve_kepler_with(2.0, 0.3, 1e-6, 0);
        assert!(!converged);
        assert_eq!(e_anom, 2.0);
    }

    #[test]
    fn test_gmst_at_epoch() {
        assert_relative_eq!(gmst_rad(J2000_UNIX_SECS).to_degrees(), 280.46061837, epsilon = 1e-9);
        // One sidereal day later it is back where it started
        let sidereal_day = 86_164.0905;
        let delta = gmst_rad(J2000_UNIX_SECS + sidereal_day) - gmst_rad(J2000_UNIX_SECS);
        assert!(delta.abs() < 1e-4);
    }

    #[test]
    fn test_look_angles_overhead_and_horizon() {
        let observer = Observer {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
        };
        let overhead = Vector3::new(EARTH_RADIUS_KM + 20_000.0, 0.0, 0.0);
        let (_, el, range) = look_angles(&observer, &overhead);
        assert_relative_eq!(el, 90.0, epsilon = 1e-9);
        assert_relative_eq!(range, 20_000.0, epsilon = 1e-6);

        let north = Vector3::new(EARTH_RADIUS_KM, 0.0, 1_000.0);
        let (az, el, _) = look_angles(&observer, &north);
        assert!(crate::angles::separation(az, 0.0) < 1e-9);
        assert_relative_eq!(el, 0.0, epsilon = 1e-9);

        let east = Vector3::new(EARTH_RADIUS_KM, 1_000.0, 0.0);
        let (az, _, _) = look_angles(&observer, &east);
        assert_relative_eq!(az, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_signal_strength_bounds() {
        let overhead = signal_strength(90.0, 20_000.0, 20_000.0);
        assert_relative_eq!(overhead, 1.0, epsilon = 1e-12);
        let low = signal_strength(5.0, 25_000.0, 20_000.0);
        assert!(low < overhead);
        assert!((0.0..=1.0).contains(&low));
        assert_eq!(signal_strength(-10.0, 0.0, 20_000.0), 0.0);
    }

    #[test]
    fn test_observe_is_deterministic() {
        let model = SyntheticConstellationModel::new(&SatelliteConfig::default());
        let t = 1_700_000_000.0;
        let first = model.observe(&LONDON, t);
        let second = model.observe(&LONDON, t);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_observations_respect_mask_and_ranges() {
        let config = SatelliteConfig::default();
        let model = SyntheticConstellationModel::new(&config);
        for step in 0..24 {
            let t = 1_700_000_000.0 + step as f64 * 3_600.0;
            let sky = model.observe(&LONDON, t);
            assert!(sky.len() >= 4, "only {} visible at step {step}", sky.len());
            for obs in &sky {
                assert!(obs.elevation >= config.elevation_mask_deg);
                assert!(obs.elevation <= 90.0);
                assert!((0.0..360.0).contains(&obs.azimuth));
                assert!((0.0..=1.0).contains(&obs.signal_strength));
                assert!(obs.range_km > 18_000.0);
            }
        }
    }

    #[test]
    fn test_sky_moves_over_time() {
        let model = SyntheticConstellationModel::new(&SatelliteConfig::default());
        let before = model.observe(&LONDON, 1_700_000_000.0);
        let after = model.observe(&LONDON, 1_700_000_060.0);
        let moved = before.iter().any(|b| {
            after
                .iter()
                .find(|a| a.id == b.id)
                .map(|a| (a.azimuth - b.azimuth).abs() > 1e-6)
                .unwrap_or(false)
        });
        assert!(moved);
    }

    #[test]
    fn test_orbit_radius_matches_params() {
        let model = SyntheticConstellationModel::new(&SatelliteConfig::default());
        let gps = ConstellationParams::gps();
        let pos = model.satellite_ecef(&gps, 2, 1, 1_700_000_000.0);
        let a = gps.semi_major_axis_km;
        let e = gps.eccentricity;
        assert!(pos.norm() >= a * (1.0 - e) - 1e-6);
        assert!(pos.norm() <= a * (1.0 + e) + 1e-6);
    }

    #[test]
    fn test_invalid_observer_sees_nothing() {
        let model = SyntheticConstellationModel::new(&SatelliteConfig::default());
        let observer = Observer {
            latitude: f64::NAN,
            longitude: 0.0,
            altitude: 0.0,
        };
        assert!(model.observe(&observer, 1_700_000_000.0).is_empty());
    }
}
