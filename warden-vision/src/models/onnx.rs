//! ONNX object-detection backend

use crate::error::VisionError;
use crate::models::InferenceEngine;
use crate::utils::mat_to_chw_tensor;
use ndarray::Array4;
use opencv::core::Mat;
use opencv::imgproc;
use opencv::prelude::*;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};
use warden_core::{BoundingBox, Detection};

/// Labels the bundled weapon-detection weights were trained on
pub const WEAPON_CLASSES: &[&str] = &["knife", "pistol", "shotgun", "rifle", "machete", "grenade"];

const INPUT_WIDTH: i32 = 640;
const INPUT_HEIGHT: i32 = 640;
const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Detector backed by an ONNX Runtime session. Expensive to construct;
/// share one instance per process through [`super::ModelCache`].
pub struct OnnxDetector {
    // ort's run() takes &mut, so the session sits behind a lock
    session: Mutex<Session>,
    model_id: String,
    labels: Vec<String>,
}

impl OnnxDetector {
    pub fn new(model_path: &Path) -> Result<Self, VisionError> {
        Self::with_labels(
            model_path,
            WEAPON_CLASSES.iter().map(|s| s.to_string()).collect(),
        )
    }

    pub fn with_labels(model_path: &Path, labels: Vec<String>) -> Result<Self, VisionError> {
        if labels.is_empty() {
            return Err(VisionError::Config("Label set is empty".to_string()));
        }
        if !model_path.exists() {
            return Err(VisionError::ModelUnavailable(format!(
                "Weights file not found: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| VisionError::Ort(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VisionError::Ort(format!("Failed to set optimization level: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| {
                VisionError::ModelUnavailable(format!(
                    "Failed to load model {}: {}",
                    model_path.display(),
                    e
                ))
            })?;

        info!("Detection model loaded from {:?}", model_path);

        Ok(Self {
            session: Mutex::new(session),
            model_id: model_path.to_string_lossy().into_owned(),
            labels,
        })
    }

    /// Resize to model input and convert to a [1, 3, H, W] float tensor
    fn preprocess(&self, frame: &Mat) -> Result<Array4<f32>, VisionError> {
        let mut resized = Mat::default();
        imgproc::resize(
            frame,
            &mut resized,
            opencv::core::Size::new(INPUT_WIDTH, INPUT_HEIGHT),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )
        .map_err(|e| VisionError::OpenCv(format!("Failed to resize frame: {}", e)))?;

        let data = mat_to_chw_tensor(&resized)?;
        Array4::from_shape_vec(
            (1, 3, INPUT_HEIGHT as usize, INPUT_WIDTH as usize),
            data,
        )
        .map_err(|e| VisionError::Ort(format!("Failed to build input tensor: {}", e)))
    }

    /// Decode a flat [1, N, 5 + classes] output: center-box coordinates in
    /// model-input pixels, objectness at index 4, class scores after.
    fn postprocess(&self, data: &[f32], frame: &Mat, threshold: f32) -> Vec<Detection> {
        let attrs = 5 + self.labels.len();
        if data.len() < attrs {
            return Vec::new();
        }

        let scale_x = frame.cols() as f32 / INPUT_WIDTH as f32;
        let scale_y = frame.rows() as f32 / INPUT_HEIGHT as f32;
        if scale_x <= 0.0 || scale_y <= 0.0 {
            return Vec::new();
        }

        let mut detections = Vec::new();
        for row in data.chunks_exact(attrs) {
            let objectness = row[4];
            if !objectness.is_finite() || objectness < threshold {
                continue;
            }

            let mut best_class = 0usize;
            let mut best_prob = 0.0f32;
            for (idx, prob) in row[5..].iter().enumerate() {
                if *prob > best_prob {
                    best_prob = *prob;
                    best_class = idx;
                }
            }

            let confidence = objectness * best_prob;
            if confidence < threshold {
                continue;
            }

            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) {
                continue;
            }

            let x = ((cx - w / 2.0) * scale_x).max(0.0);
            let y = ((cy - h / 2.0) * scale_y).max(0.0);
            let w = (w * scale_x).min(frame.cols() as f32 - x);
            let h = (h * scale_y).min(frame.rows() as f32 - y);
            if w <= 0.0 || h <= 0.0 {
                continue;
            }

            if let Some(det) = Detection::new(
                &self.labels[best_class],
                confidence,
                BoundingBox::new(x, y, w, h),
            ) {
                detections.push(det);
            }
        }

        apply_nms(detections, NMS_IOU_THRESHOLD)
    }
}

impl InferenceEngine for OnnxDetector {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn infer(&self, frame: &Mat, threshold: f32) -> Result<Vec<Detection>, VisionError> {
        debug!("Running detection on frame");
        let input = self.preprocess(frame)?;

        let mut session = self.session.lock();
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| VisionError::Ort("Model defines no outputs".to_string()))?;

        let tensor = Value::from_array(input)
            .map_err(|e| VisionError::Ort(format!("Failed to create input value: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| VisionError::Ort(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get(&output_name)
            .ok_or_else(|| VisionError::Ort("Model produced no output".to_string()))?;

        let extracted = output
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::Ort(format!("Failed to extract output tensor: {}", e)))?;

        let detections = self.postprocess(extracted.1, frame, threshold);
        debug!("Detected {} objects", detections.len());
        Ok(detections)
    }
}

/// Non-maximum suppression: keep the highest-confidence box among
/// overlapping detections.
pub fn apply_nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    detections.retain(|d| d.confidence.is_finite());
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..detections.len() {
            if !suppressed[j] && iou(&detections[i].bbox, &detections[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
        keep.push(detections[i].clone());
    }

    keep
}

/// Intersection-over-union of two x/y/w/h boxes
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    if a.w <= 0.0 || a.h <= 0.0 || b.w <= 0.0 || b.h <= 0.0 {
        return 0.0;
    }

    let inter_x_min = a.x.max(b.x);
    let inter_y_min = a.y.max(b.y);
    let inter_x_max = (a.x + a.w).min(b.x + b.w);
    let inter_y_max = (a.y + a.h).min(b.y + b.h);

    if inter_x_max <= inter_x_min || inter_y_max <= inter_y_min {
        return 0.0;
    }

    let inter = (inter_x_max - inter_x_min) * (inter_y_max - inter_y_min);
    let union = a.w * a.h + b.w * b.h - inter;
    if union <= 0.0 || !union.is_finite() {
        return 0.0;
    }

    (inter / union).clamp(0.0, 1.0)
}
