//! Detection pipelines and their composition root

pub mod image;
pub mod video;

pub use video::sampled_frame_count;

use crate::error::VisionError;
use crate::models::ModelCache;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use warden_core::{
    DangerLevel, Detection, MediaType, SettingsProvider, TaxonomyProvider, VideoMetadata,
};

/// Result of one image run. The pipeline never raises: a failed run is
/// reported as the sentinel outcome and must not be persisted.
#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub detections: Vec<Detection>,
    pub danger_level: Option<DangerLevel>,
    pub model_used: Option<String>,
}

impl ImageOutcome {
    /// The sentinel outcome: one `category = "error"` detection, no model.
    pub(crate) fn failed() -> Self {
        Self {
            detections: vec![Detection::sentinel()],
            danger_level: None,
            model_used: None,
        }
    }

    /// Whether this run failed and must be discarded by the caller
    pub fn is_failure(&self) -> bool {
        self.model_used.is_none() || self.detections.iter().any(Detection::is_sentinel)
    }
}

/// Result of one video run
#[derive(Debug, Clone)]
pub struct VideoOutcome {
    pub detections: Vec<Detection>,
    pub danger_level: Option<DangerLevel>,
    pub model_used: String,
    pub metadata: VideoMetadata,
    pub frames_analyzed: u64,
}

/// Result of a media run dispatched by type
#[derive(Debug, Clone)]
pub enum MediaOutcome {
    Image(ImageOutcome),
    Video(VideoOutcome),
}

/// Deadline and cooperative cancellation for long pipeline runs. The
/// video loop calls [`RunControl::checkpoint`] once per frame; images
/// complete in a single inference and are not checked.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl RunControl {
    /// No deadline, never cancelled
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation; the run aborts at its next checkpoint. Safe
    /// to call from another thread through a clone.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn checkpoint(&self) -> Result<(), VisionError> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(VisionError::Cancelled(
                "Run cancelled by caller".to_string(),
            ));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(VisionError::DeadlineExceeded(
                    "Run exceeded its deadline".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Composition root for the detection pipelines.
///
/// Owns the model cache and the configuration/taxonomy providers; both
/// providers are consulted fresh at the start of every run so settings
/// and category changes take effect without a restart.
pub struct DetectionEngine {
    pub(crate) settings: Arc<dyn SettingsProvider>,
    pub(crate) taxonomy: Arc<dyn TaxonomyProvider>,
    pub(crate) models: ModelCache,
}

impl DetectionEngine {
    pub fn new(settings: Arc<dyn SettingsProvider>, taxonomy: Arc<dyn TaxonomyProvider>) -> Self {
        Self {
            settings,
            taxonomy,
            models: ModelCache::new(),
        }
    }

    /// Dispatch a file to the matching pipeline by extension.
    pub fn process_media(
        &self,
        input_path: &Path,
        output_path: &Path,
        sample_interval: u64,
        control: &RunControl,
    ) -> Result<MediaOutcome, VisionError> {
        match MediaType::from_path(input_path) {
            Some(MediaType::Image) => Ok(MediaOutcome::Image(
                self.process_image(input_path, output_path),
            )),
            Some(MediaType::Video) => self
                .process_video(input_path, output_path, sample_interval, control)
                .map(MediaOutcome::Video),
            None => Err(VisionError::Processing(format!(
                "Unsupported media extension: {}",
                input_path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_outcome_is_failure() {
        let outcome = ImageOutcome::failed();
        assert!(outcome.is_failure());
        assert_eq!(outcome.detections.len(), 1);
        assert!(outcome.detections[0].is_sentinel());
        assert!(outcome.danger_level.is_none());
        assert!(outcome.model_used.is_none());
    }

    #[test]
    fn test_clean_outcome_is_not_failure() {
        let outcome = ImageOutcome {
            detections: vec![],
            danger_level: None,
            model_used: Some("simulation".to_string()),
        };
        assert!(!outcome.is_failure());
    }

    #[test]
    fn test_run_control_unbounded_passes() {
        let control = RunControl::unbounded();
        assert!(control.checkpoint().is_ok());
    }

    #[test]
    fn test_run_control_cancel() {
        let control = RunControl::unbounded();
        let handle = control.clone();
        handle.cancel();
        match control.checkpoint() {
            Err(VisionError::Cancelled(_)) => {}
            other => panic!("Expected Cancelled, got {:?}", other),
        }
    }

    #[test]
    fn test_run_control_deadline() {
        let control = RunControl::with_deadline(Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(5));
        match control.checkpoint() {
            Err(VisionError::DeadlineExceeded(_)) => {}
            other => panic!("Expected DeadlineExceeded, got {:?}", other),
        }
    }
}
