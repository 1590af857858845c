//! Per-run backup records, captured once per path.
//!
//! A backup always reflects the pre-run state of a file: it is captured
//! lazily right before the first actual mutation of a path, reused by later
//! edits in the same run, and never deleted automatically. It is the user's
//! manual recovery path.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Pre-run snapshot of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    /// Project-relative path, as named in the plan.
    pub path: String,
    pub original_content: String,
    pub captured_at: String,
}

/// Restore requested for a path that was never mutated in this run.
#[derive(Debug, Clone)]
pub struct NoBackupError {
    pub path: String,
}

impl fmt::Display for NoBackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no backup recorded for '{}'", self.path)
    }
}

impl std::error::Error for NoBackupError {}

/// JSON-backed backup store for one run.
#[derive(Debug)]
pub struct BackupStore {
    record_path: PathBuf,
    entries: Vec<Backup>,
}

impl BackupStore {
    /// Open the store for one run. A missing record file means no backups yet.
    pub fn open(record_path: &Path) -> Result<Self> {
        let entries = if record_path.exists() {
            let contents = fs::read_to_string(record_path)
                .with_context(|| format!("read backups {}", record_path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("parse backups {}", record_path.display()))?
        } else {
            Vec::new()
        };
        Ok(Self {
            record_path: record_path.to_path_buf(),
            entries,
        })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|entry| entry.path == path)
    }

    /// Capture a backup for `path` unless one already exists for this run.
    ///
    /// Returns true when a new backup was recorded. The record file is
    /// persisted before the caller mutates the file, so a crash between the
    /// two leaves the backup in place, never the other way around.
    pub fn capture_once(&mut self, path: &str, content: &str, captured_at: &str) -> Result<bool> {
        if self.contains(path) {
            debug!(path, "backup already captured for this run");
            return Ok(false);
        }
        self.entries.push(Backup {
            path: path.to_string(),
            original_content: content.to_string(),
            captured_at: captured_at.to_string(),
        });
        self.persist()?;
        debug!(path, "backup captured");
        Ok(true)
    }

    /// Pre-run content for `path`, if a backup exists.
    pub fn original_content(&self, path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.path == path)
            .map(|entry| entry.original_content.as_str())
    }

    fn persist(&self) -> Result<()> {
        let parent = self.record_path.parent().with_context(|| {
            format!("backup path missing parent {}", self.record_path.display())
        })?;
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
        let mut buf = serde_json::to_string_pretty(&self.entries)?;
        buf.push('\n');
        let tmp_path = self.record_path.with_extension("json.tmp");
        fs::write(&tmp_path, buf)
            .with_context(|| format!("write temp backups {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.record_path)
            .with_context(|| format!("replace backups {}", self.record_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_once_records_only_the_first_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let record = temp.path().join("run-1.json");
        let mut store = BackupStore::open(&record).expect("open");

        assert!(
            store
                .capture_once("app.py", "version = 1.0", "2026-01-01T00:00:00Z")
                .expect("capture")
        );
        assert!(
            !store
                .capture_once("app.py", "version = 2.0", "2026-01-01T00:01:00Z")
                .expect("capture")
        );

        assert_eq!(store.original_content("app.py"), Some("version = 1.0"));
    }

    #[test]
    fn records_survive_reopen() {
        let temp = tempfile::tempdir().expect("tempdir");
        let record = temp.path().join("run-1.json");
        {
            let mut store = BackupStore::open(&record).expect("open");
            store
                .capture_once("a.py", "old", "2026-01-01T00:00:00Z")
                .expect("capture");
        }

        let store = BackupStore::open(&record).expect("reopen");
        assert_eq!(store.original_content("a.py"), Some("old"));
    }

    #[test]
    fn unknown_path_has_no_backup() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = BackupStore::open(&temp.path().join("run-1.json")).expect("open");
        assert_eq!(store.original_content("missing.py"), None);
    }
}
