//! Error types for warden-ingest

use thiserror::Error;
use warden_vision::VisionError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("File too large: {0}")]
    TooLarge(String),

    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    #[error("Core error: {0}")]
    Core(#[from] warden_core::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}
