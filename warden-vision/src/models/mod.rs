//! Inference engine adapters

pub mod onnx;
pub mod simulation;

pub use onnx::{OnnxDetector, WEAPON_CLASSES};
pub use simulation::SimulationEngine;

use crate::error::VisionError;
use opencv::core::Mat;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use warden_core::Detection;

/// A pluggable object-detection backend. Given a decoded frame, returns
/// detections with `frame_index`/`timestamp_seconds` unset; the caller
/// fills those in for video.
pub trait InferenceEngine: Send + Sync {
    /// Identifier recorded on detection records produced with this engine
    fn model_id(&self) -> &str;

    /// Run detection on a single frame at the given confidence threshold
    fn infer(&self, frame: &Mat, threshold: f32) -> Result<Vec<Detection>, VisionError>;
}

/// Process-wide cache for the expensive ONNX detector.
///
/// The detector is constructed at most once per weights path and shared;
/// a read check followed by a write-locked recheck guarantees exactly one
/// construction wins when several runs race on first use. Switching the
/// configured model path replaces the cached instance.
#[derive(Default)]
pub struct ModelCache {
    inner: RwLock<Option<(PathBuf, Arc<OnnxDetector>)>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&self, model_path: &Path) -> Result<Arc<OnnxDetector>, VisionError> {
        {
            let guard = self.inner.read();
            if let Some((cached_path, detector)) = guard.as_ref() {
                if cached_path == model_path {
                    return Ok(detector.clone());
                }
            }
        }

        let mut guard = self.inner.write();
        // Another run may have loaded it while we waited for the lock.
        if let Some((cached_path, detector)) = guard.as_ref() {
            if cached_path == model_path {
                return Ok(detector.clone());
            }
        }

        let detector = Arc::new(OnnxDetector::new(model_path)?);
        info!("Detection model cached for {:?}", model_path);
        *guard = Some((model_path.to_path_buf(), detector.clone()));
        Ok(detector)
    }
}
