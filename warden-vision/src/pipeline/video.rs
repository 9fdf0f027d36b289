//! Video detection pipeline
//!
//! Decodes the source video in order, runs inference on every Nth frame,
//! and re-encodes a full-length annotated copy: sampled frames carry
//! annotations, the rest pass through verbatim. Failures propagate since
//! a partially written output video is not a usable degraded result.

use crate::annotate::draw_detections;
use crate::error::VisionError;
use crate::models::simulation::simulated_video_detection;
use crate::models::InferenceEngine;
use crate::pipeline::image::{copy_verified, path_str};
use crate::pipeline::{DetectionEngine, RunControl, VideoOutcome};
use opencv::core::{Mat, Size};
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, VideoWriter};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use warden_core::config::SIMULATION_MODEL_ID;
use warden_core::{classify, DangerLevel, ModelSelection, RejectedCategories, VideoMetadata};

/// Broadly compatible encoders, tried in order until one opens
const CODEC_PRIORITY: &[&str] = &["avc1", "h264", "x264", "H264", "mp4v"];

/// Number of frames the pipeline analyzes for a given length and
/// sampling interval: every frame whose index divides evenly.
pub fn sampled_frame_count(frame_count: u64, sample_interval: u64) -> u64 {
    if sample_interval == 0 {
        return 0;
    }
    frame_count.div_ceil(sample_interval)
}

/// Read container metadata without decoding frames.
fn probe_video(video_path: &Path) -> Result<VideoMetadata, VisionError> {
    let input_str = path_str(video_path)?;
    let cap = VideoCapture::from_file(&input_str, videoio::CAP_ANY)?;
    if !cap.is_opened()? {
        return Err(VisionError::CorruptMedia(format!(
            "Cannot open video: {}",
            video_path.display()
        )));
    }

    let fps = cap.get(videoio::CAP_PROP_FPS)?;
    let frame_count = cap.get(videoio::CAP_PROP_FRAME_COUNT)?.max(0.0) as u64;
    let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)?.max(0.0) as u32;
    let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)?.max(0.0) as u32;

    Ok(VideoMetadata::new(fps, frame_count, width, height))
}

/// Open an output writer, walking the codec priority list.
fn open_writer(
    output_path: &Path,
    fps: f64,
    width: i32,
    height: i32,
) -> Result<VideoWriter, VisionError> {
    let output_str = path_str(output_path)?;
    for codec in CODEC_PRIORITY {
        let b = codec.as_bytes();
        let fourcc = VideoWriter::fourcc(b[0] as char, b[1] as char, b[2] as char, b[3] as char)?;
        let writer = VideoWriter::new(&output_str, fourcc, fps, Size::new(width, height), true)?;
        if writer.is_opened()? {
            info!("Using codec: {}", codec);
            return Ok(writer);
        }
    }
    Err(VisionError::NoCodecAvailable(format!(
        "No encoder could open output: {}",
        output_path.display()
    )))
}

impl DetectionEngine {
    /// Run detection across a video, producing an annotated copy with the
    /// same frame count as the input.
    pub fn process_video(
        &self,
        video_path: &Path,
        output_path: &Path,
        sample_interval: u64,
        control: &RunControl,
    ) -> Result<VideoOutcome, VisionError> {
        info!("Starting video detection: {:?}", video_path);
        if sample_interval == 0 {
            return Err(VisionError::Processing(
                "sample_interval must be at least 1".to_string(),
            ));
        }
        control.checkpoint()?;

        let settings = self
            .settings
            .snapshot()
            .map_err(|e| VisionError::Config(e.to_string()))?;
        settings.validate().map_err(VisionError::Config)?;
        let taxonomy = self
            .taxonomy
            .taxonomy()
            .map_err(|e| VisionError::Config(e.to_string()))?;

        let metadata = probe_video(video_path)?;
        info!(
            "Video info: {:.1}s, {} FPS, {}x{}, {} frames",
            metadata.duration_seconds,
            metadata.fps,
            metadata.width,
            metadata.height,
            metadata.frame_count
        );

        if settings.active_detection_model.is_simulation() {
            warn!("Running video detection in simulation mode");
            copy_verified(video_path, output_path)?;
            let detections = vec![simulated_video_detection()];
            let danger_level = classify(&detections, &taxonomy, &RejectedCategories::new());
            return Ok(VideoOutcome {
                detections,
                danger_level,
                model_used: SIMULATION_MODEL_ID.to_string(),
                metadata,
                frames_analyzed: 1,
            });
        }

        let ModelSelection::Onnx(model_path) = &settings.active_detection_model else {
            return Err(VisionError::Config(
                "No detection model selected".to_string(),
            ));
        };
        // No mid-stream fallback for video: a missing model aborts the run.
        let detector = self.models.get_or_load(model_path)?;

        let input_str = path_str(video_path)?;
        let mut cap = VideoCapture::from_file(&input_str, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            return Err(VisionError::CorruptMedia(format!(
                "Cannot open video: {}",
                video_path.display()
            )));
        }

        let mut writer = open_writer(
            output_path,
            metadata.fps,
            metadata.width as i32,
            metadata.height as i32,
        )?;

        info!(
            "Processing {} frames, analyzing every {} frames",
            metadata.frame_count, sample_interval
        );

        let mut detections = Vec::new();
        let mut danger_level: Option<DangerLevel> = None;
        let mut frame_idx: u64 = 0;
        let mut frames_analyzed: u64 = 0;

        loop {
            control.checkpoint()?;

            let mut frame = Mat::default();
            if !cap.read(&mut frame)? || frame.empty() {
                break;
            }

            if frame_idx % sample_interval == 0 {
                let frame_dets = detector.infer(&frame, settings.dangerous_threshold)?;

                let mut annotated = frame.clone();
                draw_detections(&mut annotated, &frame_dets)?;

                let timestamp = if metadata.fps > 0.0 {
                    Some(frame_idx as f64 / metadata.fps)
                } else {
                    None
                };
                for det in frame_dets {
                    if let Some(tier) = taxonomy.tier_of(&det.category) {
                        danger_level = Some(danger_level.map_or(tier, |cur| cur.max(tier)));
                    }
                    detections.push(det.at_frame(frame_idx, timestamp));
                }

                writer.write(&annotated)?;
                frames_analyzed += 1;
            } else {
                // Unsampled frames pass through unchanged.
                writer.write(&frame)?;
            }

            frame_idx += 1;
            if frame_idx % 100 == 0 && metadata.frame_count > 0 {
                debug!(
                    "Video progress: {:.0}%",
                    frame_idx as f64 / metadata.frame_count as f64 * 100.0
                );
            }
        }

        cap.release()?;
        writer.release()?;

        let written = fs::metadata(output_path).map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(VisionError::WriteFailed(format!(
                "Output video not created: {}",
                output_path.display()
            )));
        }
        info!(
            "Output video created: {:?} ({} bytes)",
            output_path, written
        );

        info!(
            "Video detection completed: {} objects in {} frames, danger_level: {:?}",
            detections.len(),
            frames_analyzed,
            danger_level
        );

        Ok(VideoOutcome {
            detections,
            danger_level,
            model_used: settings.active_detection_model.model_id(),
            metadata,
            frames_analyzed,
        })
    }
}
