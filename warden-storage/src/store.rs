//! Detection record store
//!
//! One sled tree per entity, JSON values. `danger_level` on a record is a
//! cached derivation: it is recomputed under a per-record lock whenever a
//! category validation is created or updated.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::config::SIMULATION_MODEL_ID;
use warden_core::{
    classify, CategoryValidation, DangerLevel, DangerousCategory, Detection, DetectionRecord,
    DetectionSettings, Error, MediaType, RejectedCategories, Result, SettingsProvider, Taxonomy,
    TaxonomyProvider, VideoMetadata,
};

const SETTINGS_KEY: &[u8] = b"app";

/// Payload for a new detection record. The store stamps id and timestamp
/// and derives `is_simulated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecord {
    pub user: String,
    pub report_id: Option<Uuid>,
    pub location: Option<String>,
    pub media_type: MediaType,
    pub source_path: String,
    pub annotated_path: String,
    pub detections: Vec<Detection>,
    pub danger_level: Option<DangerLevel>,
    pub model_used: Option<String>,
    pub video_metadata: Option<VideoMetadata>,
    pub frames_analyzed: u64,
    pub processing_duration_seconds: f64,
}

/// Danger filter for record queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DangerFilter {
    /// Records with no danger level
    Normal,
    Level(DangerLevel),
}

/// Filter set for the review/report listing surface. Empty query matches
/// everything; results are newest first.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub media_type: Option<MediaType>,
    pub danger: Option<DangerFilter>,
    pub user: Option<String>,
    pub report_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Record counts bucketed by danger tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DangerCounts {
    pub normal: u64,
    pub dangerous: u64,
    pub hyperdangerous: u64,
}

pub struct DetectionStore {
    db: sled::Db,
    records: sled::Tree,
    validations: sled::Tree,
    taxonomy: sled::Tree,
    settings: sled::Tree,
    // Serializes validation upserts and danger recomputes per record
    record_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl DetectionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())
            .map_err(|e| Error::Storage(format!("Failed to open store: {}", e)))?;
        let records = open_tree(&db, "records")?;
        let validations = open_tree(&db, "validations")?;
        let taxonomy = open_tree(&db, "taxonomy")?;
        let settings = open_tree(&db, "settings")?;
        info!("Detection store opened at {:?}", path.as_ref());
        Ok(Self {
            db,
            records,
            validations,
            taxonomy,
            settings,
            record_locks: DashMap::new(),
        })
    }

    // ---- records ------------------------------------------------------

    /// Validate, normalize and persist the outcome of a pipeline run.
    pub fn insert_record(&self, new: NewRecord) -> Result<DetectionRecord> {
        if new.detections.iter().any(Detection::is_sentinel) {
            return Err(Error::InvalidRecord(
                "Refusing to persist a failed run (sentinel detection present)".to_string(),
            ));
        }
        if new.media_type == MediaType::Image && new.frames_analyzed != 0 {
            return Err(Error::InvalidRecord(format!(
                "frames_analyzed must be 0 for images, got {}",
                new.frames_analyzed
            )));
        }

        // Categories are stored trimmed and lower-cased; empty ones are
        // dropped rather than persisted.
        let detections: Vec<Detection> = new
            .detections
            .into_iter()
            .filter_map(|d| {
                Detection::new(&d.category, d.confidence, d.bbox).map(|n| Detection {
                    frame_index: d.frame_index,
                    timestamp_seconds: d.timestamp_seconds,
                    ..n
                })
            })
            .collect();

        let is_simulated = new.model_used.as_deref() == Some(SIMULATION_MODEL_ID);
        let record = DetectionRecord {
            id: Uuid::new_v4(),
            user: new.user,
            report_id: new.report_id,
            location: new.location,
            media_type: new.media_type,
            source_path: new.source_path,
            annotated_path: new.annotated_path,
            recorded_at: Utc::now(),
            detections,
            danger_level: new.danger_level,
            model_used: new.model_used,
            is_simulated,
            video_metadata: new.video_metadata,
            frames_analyzed: new.frames_analyzed,
            processing_duration_seconds: new.processing_duration_seconds,
        };

        self.put_record(&record)?;
        self.db
            .flush()
            .map_err(|e| Error::Storage(format!("Flush failed: {}", e)))?;
        debug!("Inserted detection record {}", record.id);
        Ok(record)
    }

    pub fn record(&self, id: Uuid) -> Result<DetectionRecord> {
        let bytes = self
            .records
            .get(id.as_bytes())
            .map_err(|e| Error::Storage(format!("Record read failed: {}", e)))?
            .ok_or_else(|| Error::NotFound(format!("Detection record {}", id)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// List records matching the query, newest first.
    pub fn query(&self, query: &RecordQuery) -> Result<Vec<DetectionRecord>> {
        let mut matched = Vec::new();
        for item in self.records.iter() {
            let (_, bytes) =
                item.map_err(|e| Error::Storage(format!("Record scan failed: {}", e)))?;
            let record: DetectionRecord = match serde_json::from_slice(&bytes) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping malformed record during scan: {}", e);
                    continue;
                }
            };
            if query_matches(query, &record) {
                matched.push(record);
            }
        }
        matched.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(matched)
    }

    /// Bucket the matching records by danger tier. The query's own danger
    /// filter is ignored; the other filters apply.
    pub fn danger_counts(&self, query: &RecordQuery) -> Result<DangerCounts> {
        let mut unbucketed = query.clone();
        unbucketed.danger = None;
        let mut counts = DangerCounts::default();
        for record in self.query(&unbucketed)? {
            match record.danger_level {
                None => counts.normal += 1,
                Some(DangerLevel::Dangerous) => counts.dangerous += 1,
                Some(DangerLevel::Hyperdangerous) => counts.hyperdangerous += 1,
            }
        }
        Ok(counts)
    }

    // ---- validations and re-classification ----------------------------

    /// Upsert a reviewer's verdict on one category occurrence and rederive
    /// the record's danger level. Returns the level now stored.
    ///
    /// The upsert-recompute-store sequence is a read-modify-write; it runs
    /// under a per-record lock so concurrent validations on the same
    /// record cannot interleave.
    pub fn validate_category(
        &self,
        record_id: Uuid,
        category_name: &str,
        frame_index: Option<u64>,
        is_valid: bool,
        confidence: f32,
        validator: Option<String>,
    ) -> Result<Option<DangerLevel>> {
        let name = category_name.trim().to_lowercase();
        if name.is_empty() {
            return Err(Error::InvalidRecord("Category name is empty".to_string()));
        }

        let lock = self
            .record_locks
            .entry(record_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        if self
            .records
            .get(record_id.as_bytes())
            .map_err(|e| Error::Storage(format!("Record read failed: {}", e)))?
            .is_none()
        {
            return Err(Error::NotFound(format!("Detection record {}", record_id)));
        }

        let validation = CategoryValidation {
            record_id,
            category_name: name.clone(),
            frame_index,
            is_valid,
            confidence,
            validator,
            validated_at: Utc::now(),
        };
        self.validations
            .insert(
                validation_key(record_id, &name, frame_index),
                serde_json::to_vec(&validation)?,
            )
            .map_err(|e| Error::Storage(format!("Validation write failed: {}", e)))?;
        info!(
            "Category validation stored: record={} category={} frame={:?} is_valid={}",
            record_id, name, frame_index, is_valid
        );

        // A record whose stored detections no longer parse degrades to no
        // danger level instead of failing the reviewer's request.
        let mut record = match self.record(record_id) {
            Ok(r) => r,
            Err(Error::Serialization(e)) => {
                warn!("Record {} has malformed detections: {}", record_id, e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let new_level = self.recompute_danger(&record)?;
        if new_level != record.danger_level {
            info!(
                "Danger level for {} changed: {:?} -> {:?}",
                record_id, record.danger_level, new_level
            );
            record.danger_level = new_level;
            self.put_record(&record)?;
        }
        self.db
            .flush()
            .map_err(|e| Error::Storage(format!("Flush failed: {}", e)))?;
        Ok(new_level)
    }

    /// Stored validations for a record, for the review surface.
    pub fn validations(&self, record_id: Uuid) -> Result<Vec<CategoryValidation>> {
        let mut out = Vec::new();
        for item in self.validations.scan_prefix(validation_prefix(record_id)) {
            let (_, bytes) =
                item.map_err(|e| Error::Storage(format!("Validation scan failed: {}", e)))?;
            match serde_json::from_slice::<CategoryValidation>(&bytes) {
                Ok(v) => out.push(v),
                Err(e) => warn!("Skipping malformed validation: {}", e),
            }
        }
        Ok(out)
    }

    fn recompute_danger(&self, record: &DetectionRecord) -> Result<Option<DangerLevel>> {
        let rejected =
            RejectedCategories::from_validations(self.validations(record.id)?.iter());
        let taxonomy = self.taxonomy()?;
        Ok(classify(&record.detections, &taxonomy, &rejected))
    }

    // ---- taxonomy ------------------------------------------------------

    pub fn upsert_category(&self, category: DangerousCategory) -> Result<()> {
        let key = category.name.trim().to_lowercase();
        if key.is_empty() {
            return Err(Error::InvalidRecord("Category name is empty".to_string()));
        }
        self.taxonomy
            .insert(key.as_bytes(), serde_json::to_vec(&category)?)
            .map_err(|e| Error::Storage(format!("Taxonomy write failed: {}", e)))?;
        Ok(())
    }

    pub fn set_category_active(&self, name: &str, is_active: bool) -> Result<()> {
        let key = name.trim().to_lowercase();
        let bytes = self
            .taxonomy
            .get(key.as_bytes())
            .map_err(|e| Error::Storage(format!("Taxonomy read failed: {}", e)))?
            .ok_or_else(|| Error::NotFound(format!("Category {}", name)))?;
        let mut category: DangerousCategory = serde_json::from_slice(&bytes)?;
        category.is_active = is_active;
        self.taxonomy
            .insert(key.as_bytes(), serde_json::to_vec(&category)?)
            .map_err(|e| Error::Storage(format!("Taxonomy write failed: {}", e)))?;
        Ok(())
    }

    /// Every taxonomy entry, active or not, sorted by name.
    pub fn categories(&self) -> Result<Vec<DangerousCategory>> {
        let mut out = Vec::new();
        for item in self.taxonomy.iter() {
            let (_, bytes) =
                item.map_err(|e| Error::Storage(format!("Taxonomy scan failed: {}", e)))?;
            out.push(serde_json::from_slice::<DangerousCategory>(&bytes)?);
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    // ---- settings ------------------------------------------------------

    /// Current settings, defaulting to simulation mode when none were
    /// stored yet. Read fresh on every call so changes apply to the next
    /// run without a restart.
    pub fn settings(&self) -> Result<DetectionSettings> {
        match self
            .settings
            .get(SETTINGS_KEY)
            .map_err(|e| Error::Storage(format!("Settings read failed: {}", e)))?
        {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(DetectionSettings::default()),
        }
    }

    pub fn update_settings(&self, settings: DetectionSettings) -> Result<()> {
        settings.validate().map_err(Error::Config)?;
        self.settings
            .insert(SETTINGS_KEY, serde_json::to_vec(&settings)?)
            .map_err(|e| Error::Storage(format!("Settings write failed: {}", e)))?;
        info!(
            "Detection settings updated: model={}, threshold={}",
            settings.active_detection_model.model_id(),
            settings.dangerous_threshold
        );
        Ok(())
    }

    fn put_record(&self, record: &DetectionRecord) -> Result<()> {
        self.records
            .insert(record.id.as_bytes(), serde_json::to_vec(record)?)
            .map_err(|e| Error::Storage(format!("Record write failed: {}", e)))?;
        Ok(())
    }
}

impl TaxonomyProvider for DetectionStore {
    fn taxonomy(&self) -> Result<Taxonomy> {
        Ok(Taxonomy::from_entries(self.categories()?))
    }
}

impl SettingsProvider for DetectionStore {
    fn snapshot(&self) -> Result<DetectionSettings> {
        self.settings()
    }
}

fn open_tree(db: &sled::Db, name: &str) -> Result<sled::Tree> {
    db.open_tree(name)
        .map_err(|e| Error::Storage(format!("Failed to open tree {}: {}", name, e)))
}

fn validation_prefix(record_id: Uuid) -> Vec<u8> {
    format!("{}/", record_id).into_bytes()
}

fn validation_key(record_id: Uuid, category: &str, frame_index: Option<u64>) -> Vec<u8> {
    let frame = frame_index
        .map(|f| f.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!("{}/{}/{}", record_id, category, frame).into_bytes()
}

fn query_matches(query: &RecordQuery, record: &DetectionRecord) -> bool {
    if let Some(media_type) = query.media_type {
        if record.media_type != media_type {
            return false;
        }
    }
    if let Some(danger) = query.danger {
        let matches = match danger {
            DangerFilter::Normal => record.danger_level.is_none(),
            DangerFilter::Level(level) => record.danger_level == Some(level),
        };
        if !matches {
            return false;
        }
    }
    if let Some(user) = &query.user {
        if &record.user != user {
            return false;
        }
    }
    if let Some(report_id) = query.report_id {
        if record.report_id != Some(report_id) {
            return false;
        }
    }
    if let Some(since) = query.since {
        if record.recorded_at < since {
            return false;
        }
    }
    if let Some(until) = query.until {
        if record.recorded_at > until {
            return false;
        }
    }
    true
}
