//! Position, velocity and heading estimation from noisy, intermittent
//! location and motion samples.
//!
//! [`sensor_fusion::FusionPipeline`] is the synchronous core; wrap it in a
//! [`session::TrackingSession`] to run it live on tokio.

pub mod angles;
pub mod config;
pub mod error;
pub mod filters;
pub mod fusion;
pub mod satellites;
pub mod sensor_fusion;
pub mod sensors;
pub mod session;
pub mod state_machine;
pub mod status;
pub mod types;

pub use config::TrackerConfig;
pub use error::{AcquisitionErrorKind, ConfigError, TrackerError, TrackerResult};
pub use sensor_fusion::{FusionPipeline, TrackerOutput};
pub use session::{SensorInput, SensorSender, SessionClock, TrackingSession};
pub use state_machine::TrackingState;
