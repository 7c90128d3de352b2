//! Synthetic satellite sky and the two heading estimators that read it.

pub mod constellation;
pub mod geometry;
pub mod quality;
pub mod trajectory;
pub mod triangulation;

pub use constellation::{Constellation, ConstellationParams, SatelliteId};
pub use geometry::{
    GeometrySource, Observer, SatelliteConfig, SatelliteObservation, SatelliteSnapshot,
    SyntheticConstellationModel,
};
pub use quality::GeometryQuality;
pub use trajectory::{TrajectoryConfig, TrajectoryHeadingPredictor};
pub use triangulation::{GeometricHeadingTriangulator, TriangulationConfig};
