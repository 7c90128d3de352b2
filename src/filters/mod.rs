pub mod dead_reckoning;
pub mod inertial;
pub mod movement;
pub mod position;

pub use dead_reckoning::{DeadReckoningConfig, DeadReckoningPredictor, PredictedPosition};
pub use inertial::{InertialConfig, InertialOrientationFilter, OrientationState};
pub use movement::{MovementConfig, MovementEstimator};
pub use position::{PositionFilter, PositionFilterConfig};
