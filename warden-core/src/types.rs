//! Core data model: detections, records, validations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Category name of the sentinel detection the image pipeline emits when a
/// run fails. Never persisted.
pub const SENTINEL_CATEGORY: &str = "error";

/// Extensions accepted as images
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "jfif"];

/// Extensions accepted as videos
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv", "flv"];

/// Danger tier of a detection or record. Ordered: Dangerous < Hyperdangerous.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DangerLevel {
    Dangerous,
    Hyperdangerous,
}

impl DangerLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DangerLevel::Dangerous => "DANGEROUS",
            DangerLevel::Hyperdangerous => "HYPERDANGEROUS",
        }
    }
}

impl std::fmt::Display for DangerLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of media a record was produced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    /// Classify a file by extension. Returns `None` for anything that is
    /// neither a known image nor a known video extension.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())?
            .to_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaType::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaType::Video)
        } else {
            None
        }
    }
}

/// Axis-aligned bounding box in source-image pixels: x, y, width, height
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub const ZERO: BoundingBox = BoundingBox {
        x: 0.0,
        y: 0.0,
        w: 0.0,
        h: 0.0,
    };
}

/// A single detected object. `frame_index`/`timestamp_seconds` are only
/// populated for video frames; images leave them unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub category: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_seconds: Option<f64>,
}

impl Detection {
    /// Build a detection with a normalized (trimmed, lower-cased) category.
    /// Returns `None` when the category is empty after trimming.
    pub fn new(category: impl AsRef<str>, confidence: f32, bbox: BoundingBox) -> Option<Self> {
        let category = category.as_ref().trim().to_lowercase();
        if category.is_empty() {
            return None;
        }
        Some(Self {
            category,
            confidence,
            bbox,
            frame_index: None,
            timestamp_seconds: None,
        })
    }

    /// Tag this detection with its position in a video stream.
    pub fn at_frame(mut self, frame_index: u64, timestamp_seconds: Option<f64>) -> Self {
        self.frame_index = Some(frame_index);
        self.timestamp_seconds = timestamp_seconds;
        self
    }

    /// The sentinel detection signalling "pipeline ran but failed".
    pub fn sentinel() -> Self {
        Self {
            category: SENTINEL_CATEGORY.to_string(),
            confidence: 0.0,
            bbox: BoundingBox::ZERO,
            frame_index: None,
            timestamp_seconds: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.category == SENTINEL_CATEGORY
    }
}

/// Container-level metadata extracted from a video before processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub fps: f64,
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
}

impl VideoMetadata {
    pub fn new(fps: f64, frame_count: u64, width: u32, height: u32) -> Self {
        let duration_seconds = if fps > 0.0 {
            frame_count as f64 / fps
        } else {
            0.0
        };
        Self {
            fps,
            frame_count,
            width,
            height,
            duration_seconds,
        }
    }
}

/// The persisted outcome of one pipeline run. Owns its detection list;
/// `danger_level` is derived and recomputed whenever a validation changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: Uuid,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub media_type: MediaType,
    pub source_path: String,
    pub annotated_path: String,
    pub recorded_at: DateTime<Utc>,
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub danger_level: Option<DangerLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub is_simulated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_metadata: Option<VideoMetadata>,
    pub frames_analyzed: u64,
    pub processing_duration_seconds: f64,
}

/// A human verdict on one detected category occurrence. At most one per
/// `(record, category_name, frame_index)` triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryValidation {
    pub record_id: Uuid,
    pub category_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_index: Option<u64>,
    pub is_valid: bool,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    pub validated_at: DateTime<Utc>,
}
