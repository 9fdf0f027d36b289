//! Error types for warden-vision

use thiserror::Error;
use warden_core::Error as CoreError;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Corrupt media: {0}")]
    CorruptMedia(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("No codec available: {0}")]
    NoCodecAvailable(String),

    #[error("Run cancelled: {0}")]
    Cancelled(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[error("OpenCV error: {0}")]
    OpenCv(String),
}

impl From<VisionError> for CoreError {
    fn from(err: VisionError) -> Self {
        CoreError::Vision(err.to_string())
    }
}

impl From<opencv::Error> for VisionError {
    fn from(err: opencv::Error) -> Self {
        VisionError::OpenCv(err.message)
    }
}
