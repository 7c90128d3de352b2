pub mod declination;
pub mod engine;

pub use declination::{DeclinationModel, DeclinationSetting};
pub use engine::{FusionConfig, HeadingFusionEngine, SourceWeights};
