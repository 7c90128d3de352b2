use serde::{Deserialize, Serialize};

use crate::angles::weighted_circular_mean;
use crate::error::{ConfigError, TrackerError, TrackerResult};
use crate::types::{FusionResult, HeadingSource, SourceTag};

/// Base weight of each heading source before confidence scaling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceWeights {
    pub device: f64,
    pub satellite: f64,
    pub trajectory: f64,
    pub inertial: f64,
    pub movement: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            device: 0.25,
            satellite: 0.30,
            trajectory: 0.25,
            inertial: 0.15,
            movement: 0.05,
        }
    }
}

impl SourceWeights {
    pub fn weight_for(&self, tag: SourceTag) -> f64 {
        match tag {
            SourceTag::Device => self.device,
            SourceTag::Satellite => self.satellite,
            SourceTag::Trajectory => self.trajectory,
            SourceTag::Inertial => self.inertial,
            SourceTag::Movement => self.movement,
        }
    }

    pub fn max_weight(&self) -> f64 {
        SourceTag::ALL
            .iter()
            .map(|tag| self.weight_for(*tag))
            .fold(0.0, f64::max)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub weights: SourceWeights,
    /// Total effective weight that maps to full confidence
    pub reference_total: f64,
    /// Mean resultant length below which the sources disagree too much to fuse
    pub min_resultant: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            weights: SourceWeights::default(),
            reference_total: 0.6,
            min_resultant: 0.1,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for tag in SourceTag::ALL {
            let w = self.weights.weight_for(tag);
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::invalid(
                    "fusion.weights",
                    format!("{} weight must be a non-negative number, got {w}", tag.label()),
                ));
            }
        }
        if !self.reference_total.is_finite() || self.reference_total <= 0.0 {
            return Err(ConfigError::invalid("fusion.reference_total", "must be positive"));
        }
        // single-source confidence must not exceed the source's own
        if self.reference_total < self.weights.max_weight() {
            return Err(ConfigError::invalid(
                "fusion.reference_total",
                format!(
                    "{} is below the largest base weight {}",
                    self.reference_total,
                    self.weights.max_weight()
                ),
            ));
        }
        if !(0.0..1.0).contains(&self.min_resultant) {
            return Err(ConfigError::invalid("fusion.min_resultant", "must be in [0, 1)"));
        }
        Ok(())
    }
}

/// Combines every available heading opinion into one circular mean.
pub struct HeadingFusionEngine {
    config: FusionConfig,
}

impl HeadingFusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Build a source carrying the configured base weight for `tag`.
    pub fn source(&self, tag: SourceTag, heading: f64, confidence: f64) -> HeadingSource {
        HeadingSource {
            tag,
            heading,
            weight: self.config.weights.weight_for(tag),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn fuse(&self, sources: &[HeadingSource], timestamp: f64) -> TrackerResult<FusionResult> {
        let usable: Vec<HeadingSource> = sources
            .iter()
            .filter(|s| s.heading.is_finite() && s.effective_weight() > 0.0)
            .copied()
            .collect();

        let mean = weighted_circular_mean(usable.iter().map(|s| (s.heading, s.effective_weight())))
            .ok_or(TrackerError::DegenerateGeometry {
                usable: 0,
                required: 1,
            })?;

        if mean.resultant_length < self.config.min_resultant {
            log::debug!(
                "heading sources disagree (R={:.3} over {} sources)",
                mean.resultant_length,
                usable.len()
            );
            return Err(TrackerError::DegenerateGeometry {
                usable: usable.len(),
                required: 1,
            });
        }

        Ok(FusionResult {
            heading: mean.mean,
            confidence: (mean.total_weight / self.config.reference_total).min(1.0),
            agreement: mean.resultant_length,
            sources: usable,
            timestamp,
        })
    }
}

impl Default for HeadingFusionEngine {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_no_sources_is_unavailable() {
        let engine = HeadingFusionEngine::default();
        assert!(engine.fuse(&[], 0.0).is_err());

        let zero = engine.source(SourceTag::Device, 90.0, 0.0);
        assert!(engine.fuse(&[zero], 0.0).is_err());
    }

    #[test]
    fn test_single_source_passes_through() {
        let engine = HeadingFusionEngine::default();
        for tag in SourceTag::ALL {
            for heading in [0.0, 45.0, 181.5, 359.9] {
                let confidence = 0.8;
                let source = engine.source(tag, heading, confidence);
                let result = engine.fuse(&[source], 12.0).unwrap();
                assert!(crate::angles::separation(result.heading, heading) < 1e-9);
                assert!(result.confidence <= confidence);
                assert_relative_eq!(result.agreement, 1.0, epsilon = 1e-12);
                assert_eq!(result.sources.len(), 1);
                assert_eq!(result.timestamp, 12.0);
            }
        }
    }

    #[test]
    fn test_weighted_toward_stronger_source() {
        let engine = HeadingFusionEngine::default();
        let sources = [
            engine.source(SourceTag::Satellite, 10.0, 1.0),
            engine.source(SourceTag::Movement, 50.0, 1.0),
        ];
        let result = engine.fuse(&sources, 0.0).unwrap();
        assert!(result.heading > 10.0 && result.heading < 30.0);
        assert_relative_eq!(result.confidence, 0.35 / 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_fusion_wraps_north() {
        let engine = HeadingFusionEngine::default();
        let sources = [
            engine.source(SourceTag::Device, 350.0, 1.0),
            engine.source(SourceTag::Trajectory, 10.0, 1.0),
        ];
        let result = engine.fuse(&sources, 0.0).unwrap();
        assert!(crate::angles::separation(result.heading, 0.0) < 1e-9);
    }

    #[test]
    fn test_opposed_sources_are_degenerate() {
        let engine = HeadingFusionEngine::default();
        let sources = [
            engine.source(SourceTag::Device, 0.0, 1.0),
            engine.source(SourceTag::Trajectory, 180.0, 1.0),
        ];
        assert!(matches!(
            engine.fuse(&sources, 0.0),
            Err(TrackerError::DegenerateGeometry { usable: 2, .. })
        ));
    }

    #[test]
    fn test_confidence_saturates() {
        let engine = HeadingFusionEngine::default();
        let sources: Vec<_> = SourceTag::ALL
            .iter()
            .map(|tag| engine.source(*tag, 120.0, 1.0))
            .collect();
        let result = engine.fuse(&sources, 0.0).unwrap();
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.sources.len(), 5);
    }

    #[test]
    fn test_non_finite_source_is_skipped() {
        let engine = HeadingFusionEngine::default();
        let sources = [
            engine.source(SourceTag::Device, f64::NAN, 1.0),
            engine.source(SourceTag::Inertial, 200.0, 0.5),
        ];
        let result = engine.fuse(&sources, 0.0).unwrap();
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].tag, SourceTag::Inertial);
    }

    #[test]
    fn test_config_validation() {
        assert!(FusionConfig::default().validate().is_ok());

        let mut config = FusionConfig::default();
        config.reference_total = 0.2;
        assert!(config.validate().is_err());

        let mut config = FusionConfig::default();
        config.weights.movement = -0.1;
        assert!(config.validate().is_err());

        let mut config = FusionConfig::default();
        config.min_resultant = 1.5;
        assert!(config.validate().is_err());
    }
}
