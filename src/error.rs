use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure categories reported by the raw-sample providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionErrorKind {
    PermissionDenied,
    HardwareUnavailable,
    Timeout,
}

impl AcquisitionErrorKind {
    /// Permission and hardware failures end the session; timeouts are retried upstream.
    pub fn is_fatal(self) -> bool {
        !matches!(self, AcquisitionErrorKind::Timeout)
    }
}

impl std::fmt::Display for AcquisitionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::PermissionDenied => "permission denied",
            Self::HardwareUnavailable => "hardware unavailable",
            Self::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// Tracking error types
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackerError {
    /// NaN or missing sample values; recovered with the last good value
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    /// Not enough usable satellites or sources for a directional estimate
    #[error("Degenerate geometry: {usable} usable, {required} required")]
    DegenerateGeometry { usable: usize, required: usize },

    #[error("Acquisition unavailable ({kind}): {message}")]
    AcquisitionUnavailable {
        kind: AcquisitionErrorKind,
        message: String,
    },

    #[error("Acquisition timeout: {0}")]
    AcquisitionTimeout(String),

    /// No real fix for longer than the prediction horizon
    #[error("Position stale: no fix for {seconds:.1}s")]
    PositionStale { seconds: f64 },

    #[error("Session not running")]
    NotRunning,
}

impl TrackerError {
    /// Map a provider failure onto the tracker taxonomy.
    pub fn from_acquisition(kind: AcquisitionErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            AcquisitionErrorKind::Timeout => TrackerError::AcquisitionTimeout(message),
            kind => TrackerError::AcquisitionUnavailable { kind, message },
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, TrackerError::AcquisitionUnavailable { .. })
    }
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
