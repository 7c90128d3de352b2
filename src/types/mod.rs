pub mod history;

pub use history::History;

use serde::{Deserialize, Serialize};

fn missing_coordinate() -> f64 {
    f64::NAN
}

/// Raw position sample from the location provider.
///
/// Missing coordinates deserialize as NaN so the position filter can reject
/// them the same way it rejects a glitching receiver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    pub timestamp: f64,
    #[serde(default = "missing_coordinate")]
    pub latitude: f64,
    #[serde(default = "missing_coordinate")]
    pub longitude: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters
    pub accuracy: f64,
    #[serde(default)]
    pub altitude_accuracy: Option<f64>,
    /// Course over ground reported by the provider (degrees)
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
}

impl RawFix {
    pub fn new(timestamp: f64, latitude: f64, longitude: f64, accuracy: f64) -> Self {
        RawFix {
            timestamp,
            latitude,
            longitude,
            altitude: None,
            accuracy,
            altitude_accuracy: None,
            heading: None,
            speed: None,
        }
    }

    pub fn with_altitude(mut self, altitude: f64, altitude_accuracy: Option<f64>) -> Self {
        self.altitude = Some(altitude);
        self.altitude_accuracy = altitude_accuracy;
        self
    }

    pub fn with_course(mut self, heading: f64, speed: f64) -> Self {
        self.heading = Some(heading);
        self.speed = Some(speed);
        self
    }

    pub fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Orientation event: heading-axis angle plus the platform compass if it has one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawOrientation {
    pub timestamp: f64,
    /// Rotation about the vertical axis, counter-clockwise (degrees)
    #[serde(default)]
    pub alpha: Option<f64>,
    /// Platform-native compass heading, clockwise from north (degrees)
    #[serde(default)]
    pub compass_heading: Option<f64>,
    /// Reported compass accuracy (degrees)
    #[serde(default)]
    pub compass_accuracy: Option<f64>,
}

/// Inertial sample in the body frame (x forward, y right, z down).
///
/// `acceleration` is specific force including gravity, so a level device at
/// rest reads roughly `[0, 0, -9.81]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawMotion {
    pub timestamp: f64,
    #[serde(default)]
    pub acceleration: Option<[f64; 3]>,
    /// Angular rate (rad/s)
    #[serde(default)]
    pub rotation_rate: Option<[f64; 3]>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SmoothedPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: f64,
    pub timestamp: f64,
}

/// Scalar copy kept in the position history.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp: f64,
}

impl From<&SmoothedPosition> for PositionSnapshot {
    fn from(position: &SmoothedPosition) -> Self {
        PositionSnapshot {
            latitude: position.latitude,
            longitude: position.longitude,
            accuracy: position.accuracy,
            timestamp: position.timestamp,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VelocityEstimate {
    /// Direction of travel, `None` when the displacement is too small to trust
    pub heading: Option<f64>,
    /// m/s
    pub speed: f64,
    /// meters covered between the two fixes
    pub distance: f64,
    /// seconds between the two fixes
    pub elapsed: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Device,
    Satellite,
    Trajectory,
    Inertial,
    Movement,
}

impl SourceTag {
    pub const ALL: [SourceTag; 5] = [
        SourceTag::Device,
        SourceTag::Satellite,
        SourceTag::Trajectory,
        SourceTag::Inertial,
        SourceTag::Movement,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Satellite => "satellite",
            Self::Trajectory => "trajectory",
            Self::Inertial => "inertial",
            Self::Movement => "movement",
        }
    }
}

/// One heading opinion handed to the fusion engine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeadingSource {
    pub tag: SourceTag,
    pub heading: f64,
    pub weight: f64,
    pub confidence: f64,
}

impl HeadingSource {
    pub fn effective_weight(&self) -> f64 {
        self.weight.max(0.0) * self.confidence.clamp(0.0, 1.0)
    }
}

/// Directional estimate from a single estimator (triangulation, trajectory).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeadingEstimate {
    pub heading: f64,
    pub confidence: f64,
    /// Number of satellites (or samples) that contributed
    pub contributors: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub heading: f64,
    pub confidence: f64,
    /// Mean resultant length of the weighted sources (1.0 = full agreement)
    pub agreement: f64,
    pub sources: Vec<HeadingSource>,
    pub timestamp: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionMeta {
    pub update_count: u64,
    pub is_real_fix: bool,
    pub predicted: bool,
    pub timestamp: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: f64,
    pub velocity: Option<VelocityEstimate>,
    pub meta: PositionMeta,
}
