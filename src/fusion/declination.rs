//! Magnetic-to-true heading correction.
//!
//! Only the centered tilted dipole is built in. It gets the sign and rough
//! size right over most inhabited latitudes and nothing more; plug in a real
//! field model through [`DeclinationModel`] when accuracy matters.

use serde::{Deserialize, Serialize};

use crate::angles::{normalize_deg, wrap_180};

/// Geomagnetic north pole of the dipole approximation (deg).
pub const DIPOLE_POLE_LAT: f64 = 80.65;
pub const DIPOLE_POLE_LON: f64 = -72.68;

pub trait DeclinationModel: Send {
    /// Declination at a location, east positive (deg).
    fn declination_deg(&self, latitude: f64, longitude: f64) -> f64;

    /// Turn a magnetic heading into a true one.
    fn to_true(&self, magnetic_heading: f64, latitude: f64, longitude: f64) -> f64 {
        let declination = self.declination_deg(latitude, longitude);
        if declination.is_finite() {
            normalize_deg(magnetic_heading + declination)
        } else {
            normalize_deg(magnetic_heading)
        }
    }
}

pub struct NoDeclination;

impl DeclinationModel for NoDeclination {
    fn declination_deg(&self, _latitude: f64, _longitude: f64) -> f64 {
        0.0
    }
}

pub struct FixedDeclination(pub f64);

impl DeclinationModel for FixedDeclination {
    fn declination_deg(&self, _latitude: f64, _longitude: f64) -> f64 {
        self.0
    }
}

/// Initial great-circle bearing from the observer to the dipole pole.
pub struct DipoleDeclination;

impl DeclinationModel for DipoleDeclination {
    fn declination_deg(&self, latitude: f64, longitude: f64) -> f64 {
        if !latitude.is_finite() || !longitude.is_finite() {
            return 0.0;
        }
        let phi1 = latitude.to_radians();
        let phi2 = DIPOLE_POLE_LAT.to_radians();
        let dlon = (DIPOLE_POLE_LON - longitude).to_radians();

        let y = dlon.sin() * phi2.cos();
        let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlon.cos();
        if x.hypot(y) < 1e-12 {
            return 0.0;
        }
        wrap_180(y.atan2(x).to_degrees())
    }
}

/// Config-side selector for the declination model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum DeclinationSetting {
    #[default]
    None,
    Fixed {
        degrees: f64,
    },
    Dipole,
}

impl DeclinationSetting {
    pub fn build(&self) -> Box<dyn DeclinationModel> {
        match self {
            DeclinationSetting::None => Box::new(NoDeclination),
            DeclinationSetting::Fixed { degrees } => Box::new(FixedDeclination(*degrees)),
            DeclinationSetting::Dipole => Box::new(DipoleDeclination),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fixed_correction_wraps() {
        let model = FixedDeclination(5.0);
        assert_relative_eq!(model.to_true(357.0, 0.0, 0.0), 2.0, epsilon = 1e-9);
        let model = FixedDeclination(-5.0);
        assert_relative_eq!(model.to_true(2.0, 0.0, 0.0), 357.0, epsilon = 1e-9);
    }

    #[test]
    fn test_dipole_sign() {
        let model = DipoleDeclination;
        // Western Europe sits east of the pole meridian: needle points west
        let london = model.declination_deg(51.5, -0.12);
        assert!(london < 0.0 && london > -30.0, "{london}");
        // Alaska sits west of it: needle points east
        let anchorage = model.declination_deg(61.2, -149.9);
        assert!(anchorage > 0.0, "{anchorage}");
        // Directly south of the pole
        assert!(model.declination_deg(40.0, DIPOLE_POLE_LON).abs() < 1e-9);
    }

    #[test]
    fn test_setting_deserializes() {
        let setting: DeclinationSetting =
            serde_json::from_str(r#"{"model": "fixed", "degrees": 3.5}"#).unwrap();
        assert_eq!(setting, DeclinationSetting::Fixed { degrees: 3.5 });
        assert_relative_eq!(setting.build().declination_deg(10.0, 10.0), 3.5);

        let setting: DeclinationSetting = serde_json::from_str(r#"{"model": "none"}"#).unwrap();
        assert_eq!(setting.build().to_true(123.0, 51.0, 0.0), 123.0);
    }
}
