//! Upload processing service

use crate::error::IngestError;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;
use warden_core::{DetectionRecord, MediaType};
use warden_storage::{BlobStore, DetectionStore, FsBlobStore, NewRecord};
use warden_vision::pipeline::MediaOutcome;
use warden_vision::{DetectionEngine, RunControl};

/// Analyze one frame out of every 30 by default (1 fps on 30 fps footage)
pub const DEFAULT_SAMPLE_INTERVAL: u64 = 30;

const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
const MAX_VIDEO_BYTES: usize = 500 * 1024 * 1024;

/// One uploaded file with its attribution
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub user: String,
    pub location: Option<String>,
    pub report_id: Option<Uuid>,
    pub sample_interval: u64,
}

impl UploadRequest {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>, user: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            user: user.into(),
            location: None,
            report_id: None,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }
}

/// Per-file result of a multi-file submission
#[derive(Debug)]
pub struct BatchOutcome {
    pub filename: String,
    pub result: Result<DetectionRecord, IngestError>,
}

/// Ties the pipelines, the record store and the blob store together for
/// the upload surface.
pub struct IngestService {
    engine: Arc<DetectionEngine>,
    store: Arc<DetectionStore>,
    blobs: Arc<FsBlobStore>,
}

impl IngestService {
    pub fn new(
        engine: Arc<DetectionEngine>,
        store: Arc<DetectionStore>,
        blobs: Arc<FsBlobStore>,
    ) -> Self {
        Self {
            engine,
            store,
            blobs,
        }
    }

    /// Process one upload to a persisted detection record, with no
    /// deadline and no cancellation.
    pub async fn process_upload(
        &self,
        request: UploadRequest,
    ) -> Result<DetectionRecord, IngestError> {
        self.process_upload_with_control(request, RunControl::unbounded())
            .await
    }

    /// Process one upload under the given run control. The pipeline runs
    /// on the blocking pool; video work can take time proportional to its
    /// frame count.
    pub async fn process_upload_with_control(
        &self,
        request: UploadRequest,
        control: RunControl,
    ) -> Result<DetectionRecord, IngestError> {
        let media_type = check_constraints(&request.filename, request.bytes.len())?;
        info!(
            "Received upload: {} ({} bytes, {:?})",
            request.filename,
            request.bytes.len(),
            media_type
        );

        let now = Utc::now();
        let filename = self.unique_upload_name(&request.filename, now)?;
        let source_rel = self.blobs.upload_path(now, &filename);
        let input_path = self.blobs.put(&source_rel, &request.bytes)?;
        let annotated_rel = self.blobs.result_path(now, &filename);
        let output_path = self.blobs.prepare(&annotated_rel)?;

        let sample_interval = if request.sample_interval == 0 {
            DEFAULT_SAMPLE_INTERVAL
        } else {
            request.sample_interval
        };

        let engine = self.engine.clone();
        let started = Instant::now();
        let outcome = tokio::task::spawn_blocking(move || {
            engine.process_media(&input_path, &output_path, sample_interval, &control)
        })
        .await
        .map_err(|e| IngestError::Task(e.to_string()))??;
        let processing_duration_seconds = started.elapsed().as_secs_f64();

        let new = match outcome {
            MediaOutcome::Image(image) => {
                if image.is_failure() {
                    // The sentinel result means "ran, but failed"; it is
                    // never recorded as a clean zero-detection run.
                    warn!("Image pipeline reported failure for {}", request.filename);
                    return Err(IngestError::DetectionFailed(format!(
                        "Detection failed for {}",
                        request.filename
                    )));
                }
                NewRecord {
                    user: request.user,
                    report_id: request.report_id,
                    location: request.location,
                    media_type: MediaType::Image,
                    source_path: source_rel,
                    annotated_path: annotated_rel,
                    detections: image.detections,
                    danger_level: image.danger_level,
                    model_used: image.model_used,
                    video_metadata: None,
                    frames_analyzed: 0,
                    processing_duration_seconds,
                }
            }
            MediaOutcome::Video(video) => NewRecord {
                user: request.user,
                report_id: request.report_id,
                location: request.location,
                media_type: MediaType::Video,
                source_path: source_rel,
                annotated_path: annotated_rel,
                detections: video.detections,
                danger_level: video.danger_level,
                model_used: Some(video.model_used),
                video_metadata: Some(video.metadata),
                frames_analyzed: video.frames_analyzed,
                processing_duration_seconds,
            },
        };

        let record = self.store.insert_record(new)?;
        info!(
            "Detection record {} created in {:.2}s",
            record.id, processing_duration_seconds
        );
        Ok(record)
    }

    /// Process several files under one optional report. Files fail
    /// independently; one corrupt upload never aborts the rest.
    pub async fn process_batch(
        &self,
        requests: Vec<UploadRequest>,
        report_id: Option<Uuid>,
    ) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for mut request in requests {
            if report_id.is_some() {
                request.report_id = report_id;
            }
            let filename = request.filename.clone();
            let result = self.process_upload(request).await;
            if let Err(e) = &result {
                warn!("Upload {} failed: {}", filename, e);
            }
            outcomes.push(BatchOutcome { filename, result });
        }
        outcomes
    }

    /// Pick a name that does not collide with an existing upload from the
    /// same day, suffixing an index when needed.
    fn unique_upload_name(
        &self,
        filename: &str,
        now: chrono::DateTime<Utc>,
    ) -> Result<String, IngestError> {
        let candidate = self.blobs.sanitize_filename(filename);
        if !self
            .blobs
            .full_path(&self.blobs.upload_path(now, &candidate))
            .exists()
        {
            return Ok(candidate);
        }

        let path = Path::new(&candidate);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("upload");
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        for idx in 1..10_000 {
            let candidate = format!("{}_{}{}", stem, idx, ext);
            if !self
                .blobs
                .full_path(&self.blobs.upload_path(now, &candidate))
                .exists()
            {
                return Ok(candidate);
            }
        }
        // Pathological collision rate; fall back to a random suffix.
        Ok(format!("{}_{}{}", stem, Uuid::new_v4().simple(), ext))
    }
}

/// Boundary checks owned by the upload surface: known extension, size cap
/// per media kind.
fn check_constraints(filename: &str, size: usize) -> Result<MediaType, IngestError> {
    let media_type = MediaType::from_path(filename)
        .ok_or_else(|| IngestError::UnsupportedType(filename.to_string()))?;

    let limit = match media_type {
        MediaType::Image => MAX_IMAGE_BYTES,
        MediaType::Video => MAX_VIDEO_BYTES,
    };
    if size > limit {
        return Err(IngestError::TooLarge(format!(
            "{} is {} bytes (limit {})",
            filename, size, limit
        )));
    }
    Ok(media_type)
}
