//! Detection store integration tests

use tempfile::TempDir;
use uuid::Uuid;
use warden_core::config::{DetectionSettings, ModelSelection};
use warden_core::{
    BoundingBox, DangerLevel, DangerousCategory, Detection, MediaType, SettingsProvider,
    TaxonomyProvider, VideoMetadata,
};
use warden_storage::{DangerCounts, DangerFilter, DetectionStore, NewRecord, RecordQuery};

fn open_store() -> (TempDir, DetectionStore) {
    let dir = TempDir::new().unwrap();
    let store = DetectionStore::open(dir.path().join("db")).unwrap();
    store
        .upsert_category(DangerousCategory::new("knife", DangerLevel::Dangerous))
        .unwrap();
    store
        .upsert_category(DangerousCategory::new("shotgun", DangerLevel::Hyperdangerous))
        .unwrap();
    (dir, store)
}

fn det(category: &str) -> Detection {
    Detection::new(category, 0.9, BoundingBox::ZERO).unwrap()
}

fn video_record(detections: Vec<Detection>, danger: Option<DangerLevel>) -> NewRecord {
    NewRecord {
        user: "operator@example.com".to_string(),
        report_id: None,
        location: None,
        media_type: MediaType::Video,
        source_path: "uploads/2026/08/05/clip.mp4".to_string(),
        annotated_path: "detection_results/2026/08/05/clip.mp4".to_string(),
        detections,
        danger_level: danger,
        model_used: Some("models/weapon.onnx".to_string()),
        video_metadata: Some(VideoMetadata::new(30.0, 90, 640, 480)),
        frames_analyzed: 3,
        processing_duration_seconds: 1.5,
    }
}

fn image_record(detections: Vec<Detection>, danger: Option<DangerLevel>) -> NewRecord {
    NewRecord {
        media_type: MediaType::Image,
        source_path: "uploads/2026/08/05/shot.jpg".to_string(),
        annotated_path: "detection_results/2026/08/05/shot.jpg".to_string(),
        video_metadata: None,
        frames_analyzed: 0,
        ..video_record(detections, danger)
    }
}

#[test]
fn test_insert_and_read_round_trip() {
    let (_dir, store) = open_store();
    let inserted = store
        .insert_record(video_record(
            vec![det("knife"), det("shotgun")],
            Some(DangerLevel::Hyperdangerous),
        ))
        .unwrap();

    let loaded = store.record(inserted.id).unwrap();
    assert_eq!(loaded.detections.len(), 2);
    assert_eq!(loaded.danger_level, Some(DangerLevel::Hyperdangerous));
    assert_eq!(loaded.media_type, MediaType::Video);
    assert!(!loaded.is_simulated);
}

#[test]
fn test_insert_normalizes_categories() {
    let (_dir, store) = open_store();
    let raw = Detection {
        category: "  Knife ".to_string(),
        confidence: 0.8,
        bbox: BoundingBox::ZERO,
        frame_index: Some(30),
        timestamp_seconds: Some(1.0),
    };
    let empty = Detection {
        category: "   ".to_string(),
        confidence: 0.8,
        bbox: BoundingBox::ZERO,
        frame_index: None,
        timestamp_seconds: None,
    };
    let record = store
        .insert_record(video_record(vec![raw, empty], None))
        .unwrap();

    assert_eq!(record.detections.len(), 1);
    assert_eq!(record.detections[0].category, "knife");
    // Frame tags survive normalization.
    assert_eq!(record.detections[0].frame_index, Some(30));
}

#[test]
fn test_insert_rejects_sentinel() {
    let (_dir, store) = open_store();
    let result = store.insert_record(image_record(vec![Detection::sentinel()], None));
    assert!(result.is_err());
}

#[test]
fn test_insert_rejects_frames_analyzed_on_images() {
    let (_dir, store) = open_store();
    let mut new = image_record(vec![det("knife")], Some(DangerLevel::Dangerous));
    new.frames_analyzed = 3;
    assert!(store.insert_record(new).is_err());
}

#[test]
fn test_is_simulated_derived_from_model() {
    let (_dir, store) = open_store();
    let mut new = image_record(vec![det("knife")], Some(DangerLevel::Dangerous));
    new.model_used = Some("simulation".to_string());
    let record = store.insert_record(new).unwrap();
    assert!(record.is_simulated);

    let record = store
        .insert_record(image_record(vec![det("knife")], Some(DangerLevel::Dangerous)))
        .unwrap();
    assert!(!record.is_simulated);
}

#[test]
fn test_missing_record_is_not_found() {
    let (_dir, store) = open_store();
    assert!(store.record(Uuid::new_v4()).is_err());
    assert!(store
        .validate_category(Uuid::new_v4(), "knife", None, false, 0.9, None)
        .is_err());
}

#[test]
fn test_reclassification_scenarios() {
    let (_dir, store) = open_store();
    let record = store
        .insert_record(video_record(
            vec![
                det("knife").at_frame(0, Some(0.0)),
                det("shotgun").at_frame(30, Some(1.0)),
            ],
            Some(DangerLevel::Hyperdangerous),
        ))
        .unwrap();

    // Rejecting the hyperdangerous match downgrades to the next tier.
    let level = store
        .validate_category(record.id, "shotgun", Some(30), false, 0.9, None)
        .unwrap();
    assert_eq!(level, Some(DangerLevel::Dangerous));
    assert_eq!(
        store.record(record.id).unwrap().danger_level,
        Some(DangerLevel::Dangerous)
    );

    // Rejecting everything leaves no danger at all.
    let level = store
        .validate_category(record.id, "knife", Some(0), false, 0.9, None)
        .unwrap();
    assert_eq!(level, None);
    assert_eq!(store.record(record.id).unwrap().danger_level, None);

    // Re-accepting restores the derived level.
    let level = store
        .validate_category(record.id, "shotgun", Some(30), true, 0.9, None)
        .unwrap();
    assert_eq!(level, Some(DangerLevel::Hyperdangerous));
}

#[test]
fn test_recompute_without_rejections_is_stable() {
    let (_dir, store) = open_store();
    let record = store
        .insert_record(video_record(
            vec![det("knife"), det("shotgun")],
            Some(DangerLevel::Hyperdangerous),
        ))
        .unwrap();

    // An accepting validation triggers a recompute that must agree with
    // the level computed at ingest time.
    let level = store
        .validate_category(record.id, "shotgun", None, true, 0.9, None)
        .unwrap();
    assert_eq!(level, Some(DangerLevel::Hyperdangerous));
    assert_eq!(
        store.record(record.id).unwrap().danger_level,
        Some(DangerLevel::Hyperdangerous)
    );
}

#[test]
fn test_rejection_is_frame_insensitive() {
    let (_dir, store) = open_store();
    let record = store
        .insert_record(video_record(
            vec![
                det("shotgun").at_frame(0, Some(0.0)),
                det("shotgun").at_frame(30, Some(1.0)),
                det("shotgun").at_frame(60, Some(2.0)),
            ],
            Some(DangerLevel::Hyperdangerous),
        ))
        .unwrap();

    // One rejected occurrence rejects the category across the record.
    let level = store
        .validate_category(record.id, "shotgun", Some(30), false, 0.9, None)
        .unwrap();
    assert_eq!(level, None);
}

#[test]
fn test_validation_upsert_is_unique_per_triple() {
    let (_dir, store) = open_store();
    let record = store
        .insert_record(video_record(
            vec![det("shotgun").at_frame(30, Some(1.0))],
            Some(DangerLevel::Hyperdangerous),
        ))
        .unwrap();

    store
        .validate_category(record.id, "shotgun", Some(30), false, 0.9, None)
        .unwrap();
    store
        .validate_category(record.id, "shotgun", Some(30), true, 0.9, None)
        .unwrap();

    // Same triple twice: one stored row, holding the latest verdict.
    let validations = store.validations(record.id).unwrap();
    assert_eq!(validations.len(), 1);
    assert!(validations[0].is_valid);

    // A different frame for the same category is its own row.
    store
        .validate_category(record.id, "shotgun", Some(60), false, 0.9, None)
        .unwrap();
    assert_eq!(store.validations(record.id).unwrap().len(), 2);
}

#[test]
fn test_reclassification_tracks_taxonomy_changes() {
    let (_dir, store) = open_store();
    let record = store
        .insert_record(video_record(
            vec![det("knife")],
            Some(DangerLevel::Dangerous),
        ))
        .unwrap();

    // Deactivate the category, then trigger a recompute via a validation
    // on an unrelated name: the snapshot is read fresh, so knife no
    // longer counts.
    store.set_category_active("knife", false).unwrap();
    let level = store
        .validate_category(record.id, "pistol", None, false, 0.5, None)
        .unwrap();
    assert_eq!(level, None);
}

#[test]
fn test_query_filters() {
    let (_dir, store) = open_store();
    let report = Uuid::new_v4();

    store
        .insert_record(video_record(
            vec![det("shotgun")],
            Some(DangerLevel::Hyperdangerous),
        ))
        .unwrap();
    let mut flagged = image_record(vec![det("knife")], Some(DangerLevel::Dangerous));
    flagged.report_id = Some(report);
    flagged.user = "reviewer@example.com".to_string();
    store.insert_record(flagged).unwrap();
    store.insert_record(image_record(vec![], None)).unwrap();

    let all = store.query(&RecordQuery::default()).unwrap();
    assert_eq!(all.len(), 3);

    let images = store
        .query(&RecordQuery {
            media_type: Some(MediaType::Image),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(images.len(), 2);

    let normal = store
        .query(&RecordQuery {
            danger: Some(DangerFilter::Normal),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(normal.len(), 1);

    let hyper = store
        .query(&RecordQuery {
            danger: Some(DangerFilter::Level(DangerLevel::Hyperdangerous)),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(hyper.len(), 1);

    let by_user = store
        .query(&RecordQuery {
            user: Some("reviewer@example.com".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_user.len(), 1);

    let by_report = store
        .query(&RecordQuery {
            report_id: Some(report),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_report.len(), 1);
}

#[test]
fn test_danger_counts() {
    let (_dir, store) = open_store();
    store
        .insert_record(video_record(
            vec![det("shotgun")],
            Some(DangerLevel::Hyperdangerous),
        ))
        .unwrap();
    store
        .insert_record(image_record(vec![det("knife")], Some(DangerLevel::Dangerous)))
        .unwrap();
    store.insert_record(image_record(vec![], None)).unwrap();
    store.insert_record(image_record(vec![], None)).unwrap();

    let counts = store.danger_counts(&RecordQuery::default()).unwrap();
    assert_eq!(
        counts,
        DangerCounts {
            normal: 2,
            dangerous: 1,
            hyperdangerous: 1,
        }
    );
}

#[test]
fn test_taxonomy_snapshot_excludes_inactive() {
    let (_dir, store) = open_store();
    store.set_category_active("knife", false).unwrap();

    let snapshot = store.taxonomy().unwrap();
    assert_eq!(snapshot.tier_of("knife"), None);
    assert_eq!(
        snapshot.tier_of("shotgun"),
        Some(DangerLevel::Hyperdangerous)
    );

    // The full listing still carries the inactive entry.
    assert_eq!(store.categories().unwrap().len(), 2);
}

#[test]
fn test_settings_default_and_update() {
    let (_dir, store) = open_store();
    let settings = store.snapshot().unwrap();
    assert!(settings.active_detection_model.is_simulation());
    assert_eq!(settings.dangerous_threshold, 0.5);

    store
        .update_settings(DetectionSettings {
            active_detection_model: ModelSelection::Onnx("models/weapon.onnx".into()),
            dangerous_threshold: 0.7,
        })
        .unwrap();
    let settings = store.snapshot().unwrap();
    assert!(!settings.active_detection_model.is_simulation());
    assert_eq!(settings.dangerous_threshold, 0.7);

    // Out-of-range thresholds never land.
    assert!(store
        .update_settings(DetectionSettings {
            active_detection_model: ModelSelection::Simulation,
            dangerous_threshold: 0.01,
        })
        .is_err());
    assert_eq!(store.snapshot().unwrap().dangerous_threshold, 0.7);
}

#[test]
fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let id = {
        let store = DetectionStore::open(dir.path().join("db")).unwrap();
        store
            .upsert_category(DangerousCategory::new("knife", DangerLevel::Dangerous))
            .unwrap();
        store
            .insert_record(image_record(vec![det("knife")], Some(DangerLevel::Dangerous)))
            .unwrap()
            .id
    };

    let store = DetectionStore::open(dir.path().join("db")).unwrap();
    let record = store.record(id).unwrap();
    assert_eq!(record.danger_level, Some(DangerLevel::Dangerous));
}
