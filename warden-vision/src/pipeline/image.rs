//! Single-image detection pipeline
//!
//! Unlike the video pipeline this one never raises: every internal
//! failure is converted into the sentinel outcome so a batch of uploads
//! survives one bad file. Callers must check `ImageOutcome::is_failure`
//! before persisting anything.

use crate::annotate::draw_detections;
use crate::error::VisionError;
use crate::models::simulation::simulated_image_detection;
use crate::models::InferenceEngine;
use crate::pipeline::{DetectionEngine, ImageOutcome};
use opencv::core::Vector;
use opencv::imgcodecs;
use opencv::prelude::*;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};
use warden_core::config::SIMULATION_MODEL_ID;
use warden_core::{classify, ModelSelection, RejectedCategories};

impl DetectionEngine {
    /// Run detection on one image, writing the annotated copy to
    /// `output_path`.
    pub fn process_image(&self, input_path: &Path, output_path: &Path) -> ImageOutcome {
        info!("Starting detection for image: {:?}", input_path);
        match self.try_process_image(input_path, output_path) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Image detection failed: {}", e);
                ImageOutcome::failed()
            }
        }
    }

    fn try_process_image(
        &self,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<ImageOutcome, VisionError> {
        let settings = self
            .settings
            .snapshot()
            .map_err(|e| VisionError::Config(e.to_string()))?;
        settings.validate().map_err(VisionError::Config)?;
        let taxonomy = self
            .taxonomy
            .taxonomy()
            .map_err(|e| VisionError::Config(e.to_string()))?;

        if settings.active_detection_model.is_simulation() {
            warn!("Running image detection in simulation mode");
            // The output is the input, byte for byte; no decode needed.
            copy_verified(input_path, output_path)?;
            let detections = vec![simulated_image_detection()];
            let danger_level = classify(&detections, &taxonomy, &RejectedCategories::new());
            return Ok(ImageOutcome {
                detections,
                danger_level,
                model_used: Some(SIMULATION_MODEL_ID.to_string()),
            });
        }

        let ModelSelection::Onnx(model_path) = &settings.active_detection_model else {
            return Err(VisionError::Config(
                "No detection model selected".to_string(),
            ));
        };
        let detector = self.models.get_or_load(model_path)?;

        let input_str = path_str(input_path)?;
        let frame = imgcodecs::imread(&input_str, imgcodecs::IMREAD_COLOR)?;
        if frame.empty() {
            return Err(VisionError::CorruptMedia(format!(
                "Image unreadable: {}",
                input_path.display()
            )));
        }

        let detections = detector.infer(&frame, settings.dangerous_threshold)?;

        let mut annotated = frame.clone();
        draw_detections(&mut annotated, &detections)?;

        let output_str = path_str(output_path)?;
        imgcodecs::imwrite(&output_str, &annotated, &Vector::new())?;
        if !output_path.exists() {
            return Err(VisionError::WriteFailed(format!(
                "Annotated image not written: {}",
                output_path.display()
            )));
        }

        let danger_level = classify(&detections, &taxonomy, &RejectedCategories::new());
        info!(
            "Detection completed: {} objects found, danger_level: {:?}",
            detections.len(),
            danger_level
        );

        Ok(ImageOutcome {
            detections,
            danger_level,
            model_used: Some(settings.active_detection_model.model_id()),
        })
    }
}

pub(crate) fn path_str(path: &Path) -> Result<String, VisionError> {
    path.to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| VisionError::Processing(format!("Non-UTF8 path: {:?}", path)))
}

/// Copy input to output and confirm it landed on disk.
pub(crate) fn copy_verified(input_path: &Path, output_path: &Path) -> Result<(), VisionError> {
    fs::copy(input_path, output_path)?;
    let written = fs::metadata(output_path).map(|m| m.len()).unwrap_or(0);
    if written == 0 && fs::metadata(input_path)?.len() > 0 {
        return Err(VisionError::WriteFailed(format!(
            "Copy did not land on disk: {}",
            output_path.display()
        )));
    }
    Ok(())
}
