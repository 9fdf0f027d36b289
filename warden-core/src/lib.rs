//! warden-core: shared types for the warden detection system
//!
//! Holds the data model (detections, records, taxonomy), the danger
//! classifier, the configuration contracts, and the workspace-wide error
//! type. This crate performs no I/O; the vision and storage crates build
//! on it.

pub mod classifier;
pub mod config;
pub mod error;
pub mod taxonomy;
pub mod types;

pub use classifier::{classify, RejectedCategories};
pub use config::{DetectionSettings, ModelSelection, SettingsProvider, StaticSettings};
pub use error::{Error, Result};
pub use taxonomy::{DangerousCategory, StaticTaxonomy, Taxonomy, TaxonomyProvider};
pub use types::{
    BoundingBox, CategoryValidation, DangerLevel, Detection, DetectionRecord, MediaType,
    VideoMetadata,
};
