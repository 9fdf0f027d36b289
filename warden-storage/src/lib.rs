//! warden-storage: persistent state for the detection system
//!
//! An embedded sled store holding detection records, the dangerous
//! category taxonomy, per-category human validations, and the application
//! settings, plus the filesystem blob store for uploaded and annotated
//! media. Implements the provider traits the pipelines read their
//! per-run snapshots through.

pub mod blob;
pub mod store;

pub use blob::{BlobStore, FsBlobStore};
pub use store::{DangerCounts, DangerFilter, DetectionStore, NewRecord, RecordQuery};
