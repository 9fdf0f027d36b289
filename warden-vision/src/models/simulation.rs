//! Deterministic simulation backend
//!
//! Used when no model is configured or available. Results are fixed so
//! downstream behavior is reproducible bit-for-bit in tests.

use crate::error::VisionError;
use crate::models::InferenceEngine;
use opencv::core::Mat;
use warden_core::config::SIMULATION_MODEL_ID;
use warden_core::{BoundingBox, Detection};

/// Frame the simulated video detection is tagged with
pub const SIMULATED_VIDEO_FRAME: u64 = 30;

/// The fixed detection a simulated image run produces
pub fn simulated_image_detection() -> Detection {
    Detection {
        category: "knife".to_string(),
        confidence: 0.9,
        bbox: BoundingBox::new(100.0, 100.0, 50.0, 50.0),
        frame_index: None,
        timestamp_seconds: None,
    }
}

/// The fixed detection a simulated video run produces, tagged at a
/// synthetic frame marker
pub fn simulated_video_detection() -> Detection {
    Detection {
        category: "knife".to_string(),
        confidence: 0.85,
        bbox: BoundingBox::new(100.0, 100.0, 50.0, 50.0),
        frame_index: Some(SIMULATED_VIDEO_FRAME),
        timestamp_seconds: None,
    }
}

/// Engine that ignores its input entirely and reports the fixed result
pub struct SimulationEngine;

impl InferenceEngine for SimulationEngine {
    fn model_id(&self) -> &str {
        SIMULATION_MODEL_ID
    }

    fn infer(&self, _frame: &Mat, _threshold: f32) -> Result<Vec<Detection>, VisionError> {
        Ok(vec![simulated_image_detection()])
    }
}
