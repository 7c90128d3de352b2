//! Nominal orbital parameters for the synthetic constellations.
//!
//! These are round published figures used to drive a plausible sky, not an
//! ephemeris. Any table with the same shape can be substituted through config.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// WGS84 equatorial radius (km)
pub const EARTH_RADIUS_KM: f64 = 6378.137;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constellation {
    Gps,
    Glonass,
    Galileo,
    BeiDou,
    /// Test or user-defined geometry
    Synthetic,
}

impl Constellation {
    pub fn prefix(self) -> char {
        match self {
            Self::Gps => 'G',
            Self::Glonass => 'R',
            Self::Galileo => 'E',
            Self::BeiDou => 'C',
            Self::Synthetic => 'S',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SatelliteId {
    pub constellation: Constellation,
    /// 1-based slot number within the constellation
    pub number: u8,
}

impl std::fmt::Display for SatelliteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:02}", self.constellation.prefix(), self.number)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstellationParams {
    pub constellation: Constellation,
    /// Total satellites, spread evenly over `planes`
    pub satellites: u8,
    pub planes: u8,
    pub inclination_deg: f64,
    pub semi_major_axis_km: f64,
    pub period_secs: f64,
    pub eccentricity: f64,
    /// RAAN of plane 0; further planes are spaced 360/planes apart
    pub raan_offset_deg: f64,
    /// Mean-anomaly shift between adjacent planes (Walker phasing)
    pub phasing_deg: f64,
}

impl ConstellationParams {
    pub fn gps() -> Self {
        Self {
            constellation: Constellation::Gps,
            satellites: 24,
            planes: 6,
            inclination_deg: 55.0,
            semi_major_axis_km: 26_560.0,
            period_secs: 43_082.0,
            eccentricity: 0.005,
            raan_offset_deg: 0.0,
            phasing_deg: 15.0,
        }
    }

    pub fn glonass() -> Self {
        Self {
            constellation: Constellation::Glonass,
            satellites: 24,
            planes: 3,
            inclination_deg: 64.8,
            semi_major_axis_km: 25_510.0,
            period_secs: 40_544.0,
            eccentricity: 0.001,
            raan_offset_deg: 20.0,
            phasing_deg: 15.0,
        }
    }

    pub fn galileo() -> Self {
        Self {
            constellation: Constellation::Galileo,
            satellites: 24,
            planes: 3,
            inclination_deg: 56.0,
            semi_major_axis_km: 29_600.0,
            period_secs: 50_680.0,
            eccentricity: 0.0002,
            raan_offset_deg: 40.0,
            phasing_deg: 15.0,
        }
    }

    pub fn beidou_meo() -> Self {
        Self {
            constellation: Constellation::BeiDou,
            satellites: 24,
            planes: 3,
            inclination_deg: 55.0,
            semi_major_axis_km: 27_906.0,
            period_secs: 46_404.0,
            eccentricity: 0.001,
            raan_offset_deg: 60.0,
            phasing_deg: 15.0,
        }
    }

    /// GPS, GLONASS, Galileo and BeiDou MEO.
    pub fn nominal_table() -> Vec<Self> {
        vec![Self::gps(), Self::glonass(), Self::galileo(), Self::beidou_meo()]
    }

    pub fn satellites_per_plane(&self) -> u8 {
        (self.satellites / self.planes.max(1)).max(1)
    }

    pub fn altitude_km(&self) -> f64 {
        self.semi_major_axis_km - EARTH_RADIUS_KM
    }

    pub fn raan_deg(&self, plane: u8) -> f64 {
        self.raan_offset_deg + plane as f64 * 360.0 / self.planes.max(1) as f64
    }

    /// Mean anomaly at the reference epoch for a slot in a plane (deg).
    pub fn initial_mean_anomaly_deg(&self, plane: u8, slot: u8) -> f64 {
        slot as f64 * 360.0 / self.satellites_per_plane() as f64 + plane as f64 * self.phasing_deg
    }

    pub fn satellite_id(&self, plane: u8, slot: u8) -> SatelliteId {
        SatelliteId {
            constellation: self.constellation,
            number: plane * self.satellites_per_plane() + slot + 1,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.planes == 0 || self.satellites < self.planes {
            return Err(ConfigError::invalid(
                "satellites.constellations",
                format!("{:?}: need at least one satellite per plane", self.constellation),
            ));
        }
        if !(0.0..1.0).contains(&self.eccentricity) {
            return Err(ConfigError::invalid(
                "satellites.constellations",
                format!("{:?}: eccentricity must be in [0, 1)", self.constellation),
            ));
        }
        if self.semi_major_axis_km * (1.0 - self.eccentricity) <= EARTH_RADIUS_KM {
            return Err(ConfigError::invalid(
                "satellites.constellations",
                format!("{:?}: perigee inside the Earth", self.constellation),
            ));
        }
        if self.period_secs.is_nan() || self.period_secs <= 0.0 {
            return Err(ConfigError::invalid(
                "satellites.constellations",
                format!("{:?}: period must be positive", self.constellation),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nominal_table_is_valid() {
        let table = ConstellationParams::nominal_table();
        assert_eq!(table.len(), 4);
        for params in &table {
            params.validate().unwrap();
            assert!(params.altitude_km() > 19_000.0);
        }
    }

    #[test]
    fn test_satellite_ids_are_unique() {
        let gps = ConstellationParams::gps();
        let mut ids = Vec::new();
        for plane in 0..gps.planes {
            for slot in 0..gps.satellites_per_plane() {
                ids.push(gps.satellite_id(plane, slot));
            }
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 24);
        assert_eq!(ids[0].to_string(), "G01");
        assert_eq!(ids[23].to_string(), "G24");
    }

    #[test]
    fn test_raan_spacing() {
        let gps = ConstellationParams::gps();
        assert_eq!(gps.raan_deg(0), 0.0);
        assert_eq!(gps.raan_deg(3), 180.0);
    }

    #[test]
    fn test_rejects_bad_params() {
        let mut params = ConstellationParams::gps();
        params.eccentricity = 1.2;
        assert!(params.validate().is_err());

        let mut params = ConstellationParams::gps();
        params.semi_major_axis_km = 6000.0;
        assert!(params.validate().is_err());

        let mut params = ConstellationParams::gps();
        params.planes = 0;
        assert!(params.validate().is_err());
    }
}
