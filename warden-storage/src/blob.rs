//! Filesystem blob store for uploaded and annotated media
//!
//! Media lands under a date-partitioned layout: originals in
//! `uploads/YYYY/MM/DD/`, annotated outputs in
//! `detection_results/YYYY/MM/DD/`. Writes go through a temp file and an
//! atomic rename, then are verified on disk.

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use warden_core::{Error, Result};

const UPLOADS_PREFIX: &str = "uploads";
const RESULTS_PREFIX: &str = "detection_results";

pub trait BlobStore: Send + Sync {
    /// Write bytes at a path relative to the store root, creating parent
    /// directories as needed. Returns the absolute path.
    fn put(&self, relative_path: &str, bytes: &[u8]) -> Result<PathBuf>;

    /// Absolute path for a relative one, without touching the disk.
    fn full_path(&self, relative_path: &str) -> PathBuf;
}

pub struct FsBlobStore {
    root: PathBuf,
    sanitize: Regex,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let sanitize = Regex::new(r"[^\w\-\. ]")
            .map_err(|e| Error::Config(format!("Bad sanitize pattern: {}", e)))?;
        let root = root.into();
        info!("Blob store rooted at {:?}", root);
        Ok(Self { root, sanitize })
    }

    /// Replace any character outside `[\w\-. ]` with an underscore.
    pub fn sanitize_filename(&self, name: &str) -> String {
        self.sanitize.replace_all(name, "_").into_owned()
    }

    /// Relative path for an uploaded original: `uploads/YYYY/MM/DD/<name>`
    pub fn upload_path(&self, now: DateTime<Utc>, filename: &str) -> String {
        self.dated_path(UPLOADS_PREFIX, now, filename)
    }

    /// Relative path for an annotated output:
    /// `detection_results/YYYY/MM/DD/<name>`
    pub fn result_path(&self, now: DateTime<Utc>, filename: &str) -> String {
        self.dated_path(RESULTS_PREFIX, now, filename)
    }

    fn dated_path(&self, prefix: &str, now: DateTime<Utc>, filename: &str) -> String {
        format!(
            "{}/{}/{:02}/{:02}/{}",
            prefix,
            now.year(),
            now.month(),
            now.day(),
            self.sanitize_filename(filename)
        )
    }

    /// Make sure the parent directory of a relative path exists and
    /// return the absolute path, for writers that stream to the file
    /// themselves (the video encoder).
    pub fn prepare(&self, relative_path: &str) -> Result<PathBuf> {
        let full = self.full_path(relative_path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(full)
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, relative_path: &str, bytes: &[u8]) -> Result<PathBuf> {
        let full = self.prepare(relative_path)?;

        // Temp file plus rename so a crashed write never leaves a partial
        // blob at the final path.
        let tmp = full.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &full).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::Io(e)
        })?;

        let written = fs::metadata(&full).map(|m| m.len()).unwrap_or(0);
        if written != bytes.len() as u64 {
            return Err(Error::Storage(format!(
                "Blob did not land on disk: {} ({} of {} bytes)",
                full.display(),
                written,
                bytes.len()
            )));
        }

        debug!("Stored blob {} ({} bytes)", full.display(), written);
        Ok(full)
    }

    fn full_path(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }
}

impl FsBlobStore {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsBlobStore) {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_creates_parents_and_verifies() {
        let (_dir, store) = store();
        let path = store.put("uploads/2026/08/05/shot.jpg", b"bytes").unwrap();
        assert!(path.exists());
        assert_eq!(fs::read(&path).unwrap(), b"bytes");
    }

    #[test]
    fn test_put_overwrites_existing() {
        let (_dir, store) = store();
        store.put("a/b.bin", b"old").unwrap();
        let path = store.put("a/b.bin", b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_sanitize_filename() {
        let (_dir, store) = store();
        assert_eq!(
            store.sanitize_filename("cam 01/shot:raw?.jpg"),
            "cam 01_shot_raw_.jpg"
        );
        assert_eq!(store.sanitize_filename("clean-name.png"), "clean-name.png");
    }

    #[test]
    fn test_dated_layout() {
        let (_dir, store) = store();
        let when = Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap();
        assert_eq!(
            store.upload_path(when, "shot.jpg"),
            "uploads/2026/08/05/shot.jpg"
        );
        assert_eq!(
            store.result_path(when, "shot.jpg"),
            "detection_results/2026/08/05/shot.jpg"
        );
    }

    #[test]
    fn test_prepare_creates_parent_only() {
        let (_dir, store) = store();
        let full = store.prepare("detection_results/2026/08/05/out.mp4").unwrap();
        assert!(full.parent().unwrap().exists());
        assert!(!full.exists());
    }
}
