//! warden-ingest: upload handling for the detection pipelines
//!
//! Accepts uploaded media, enforces the boundary constraints, places the
//! original in the blob store, runs the matching pipeline off the async
//! runtime, and persists the outcome as a detection record. Failed image
//! runs (the sentinel outcome) and video errors leave no record behind.

pub mod error;
pub mod service;

pub use error::IngestError;
pub use service::{BatchOutcome, IngestService, UploadRequest, DEFAULT_SAMPLE_INTERVAL};
