//! warden-vision: media detection pipelines
//!
//! Runs uploaded images and videos through an object-detection backend
//! (ONNX or a deterministic simulation), annotates what it finds, and
//! classifies the result against the dangerous-category taxonomy. The
//! image pipeline never raises; the video pipeline propagates failures.

pub mod annotate;
pub mod error;
pub mod models;
pub mod pipeline;
mod utils;

pub use error::VisionError;
pub use models::{InferenceEngine, ModelCache, OnnxDetector, SimulationEngine};
pub use pipeline::{DetectionEngine, ImageOutcome, RunControl, VideoOutcome};
