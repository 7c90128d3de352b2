use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::satellites::quality::GeometryQuality;
use crate::state_machine::TrackingState;
use crate::types::{FusionResult, PositionUpdate, SourceTag};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrackerStatus {
    pub timestamp: f64,
    pub state: TrackingState,
    pub fixes_accepted: u64,
    pub fixes_rejected: u64,
    pub position_updates: u64,
    pub headings_fused: u64,
    pub errors_reported: u64,
    // Position
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub predicted: bool,
    pub seconds_since_fix: Option<f64>,
    // Heading
    pub heading_deg: Option<f64>,
    pub heading_confidence: Option<f64>,
    pub heading_agreement: Option<f64>,
    pub heading_sources: Vec<SourceTag>,
    // Satellites
    pub satellites_visible: usize,
    pub pdop_like: Option<f64>,
    // Inertial
    pub inertial_calibrated: bool,
    pub inertial_aligned: bool,
    pub tilt_deg: f64,
}

impl TrackerStatus {
    pub fn new(state: TrackingState) -> Self {
        Self {
            timestamp: current_timestamp(),
            state,
            fixes_accepted: 0,
            fixes_rejected: 0,
            position_updates: 0,
            headings_fused: 0,
            errors_reported: 0,
            latitude: None,
            longitude: None,
            accuracy: None,
            speed: None,
            predicted: false,
            seconds_since_fix: None,
            heading_deg: None,
            heading_confidence: None,
            heading_agreement: None,
            heading_sources: Vec::new(),
            satellites_visible: 0,
            pdop_like: None,
            inertial_calibrated: false,
            inertial_aligned: false,
            tilt_deg: 0.0,
        }
    }

    pub fn apply_position(&mut self, update: &PositionUpdate) {
        self.latitude = Some(update.latitude);
        self.longitude = Some(update.longitude);
        self.accuracy = Some(update.accuracy);
        self.speed = update.velocity.map(|v| v.speed);
        self.predicted = update.meta.predicted;
    }

    pub fn apply_heading(&mut self, result: &FusionResult) {
        self.heading_deg = Some(result.heading);
        self.heading_confidence = Some(result.confidence);
        self.heading_agreement = Some(result.agreement);
        self.heading_sources = result.sources.iter().map(|s| s.tag).collect();
    }

    pub fn apply_quality(&mut self, quality: Option<&GeometryQuality>) {
        self.satellites_visible = quality.map(|q| q.visible).unwrap_or(0);
        self.pdop_like = quality.map(|q| q.pdop_like);
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HeadingSource, PositionMeta};

    #[test]
    fn test_apply_and_save() {
        let mut status = TrackerStatus::new(TrackingState::Tracking);
        status.apply_position(&PositionUpdate {
            latitude: 51.5,
            longitude: -0.12,
            altitude: None,
            accuracy: 4.0,
            velocity: None,
            meta: PositionMeta {
                update_count: 1,
                is_real_fix: false,
                predicted: true,
                timestamp: 10.0,
            },
        });
        status.apply_heading(&FusionResult {
            heading: 42.0,
            confidence: 0.5,
            agreement: 0.9,
            sources: vec![HeadingSource {
                tag: SourceTag::Device,
                heading: 42.0,
                weight: 0.25,
                confidence: 1.0,
            }],
            timestamp: 10.0,
        });
        assert!(status.predicted);
        assert_eq!(status.heading_sources, vec![SourceTag::Device]);

        let path = std::env::temp_dir().join(format!("nav_fusion_status_{}.json", std::process::id()));
        status.save(&path).unwrap();
        let loaded: TrackerStatus = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.state, TrackingState::Tracking);
        assert_eq!(loaded.heading_deg, Some(42.0));
        let _ = fs::remove_file(&path);
    }
}
