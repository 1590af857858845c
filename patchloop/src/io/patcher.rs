//! File-level patch application over the pure edit engine.
//!
//! The patcher turns a proposed edit or whole-file write into a durable,
//! safely-reversible mutation: it captures a backup before the first mutation
//! of each path, writes the new content, and reports a unified diff. Side
//! effects are confined to the target path and its backup record.
//!
//! Error policy: problems with the target file (missing, unreadable,
//! unwritable) become `failed`/`skipped` step results; problems persisting
//! the backup record are structural and bubble up as errors, since mutating
//! without a trustworthy backup would break the recovery contract.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Error, Result};
use tracing::{debug, warn};

use crate::core::diff::unified_diff;
use crate::core::patch::{EditOutcome, apply_edit};
use crate::core::plan::EditOperation;
use crate::core::state::StepResult;
use crate::io::backup_store::{BackupStore, NoBackupError};
use crate::io::layout::now_rfc3339;

pub struct Patcher {
    root: PathBuf,
    backups: BackupStore,
}

impl Patcher {
    pub fn new(root: &Path, backups: BackupStore) -> Self {
        Self {
            root: root.to_path_buf(),
            backups,
        }
    }

    /// Whole-file create or overwrite.
    ///
    /// Captures a backup first when the path pre-existed and has none yet for
    /// this run. The reported diff is against the previous content; `None`
    /// when the path did not previously exist.
    pub fn write_file(&mut self, step_id: &str, path: &str, content: &str) -> Result<StepResult> {
        let full = self.root.join(path);
        let previous = match read_if_exists(&full) {
            Ok(previous) => previous,
            Err(err) => return Ok(StepResult::failed(step_id, &format!("read {path}: {err}"))),
        };

        if let Some(prev) = &previous {
            self.backups.capture_once(path, prev, &now_rfc3339())?;
        }

        if let Some(parent) = full.parent()
            && let Err(err) = fs::create_dir_all(parent)
        {
            return Ok(StepResult::failed(
                step_id,
                &format!("create parent directory for {path}: {err}"),
            ));
        }
        if let Err(err) = fs::write(&full, content) {
            return Ok(StepResult::failed(step_id, &format!("write {path}: {err}")));
        }

        let diff = previous
            .as_deref()
            .map(|prev| unified_diff(path, prev, content));
        debug!(path, overwrote = previous.is_some(), "file written");
        Ok(StepResult::applied(step_id, diff))
    }

    /// Apply an ordered sequence of edits against an existing file.
    ///
    /// Each operation mutates the evolving buffer iff its match is unique in
    /// it; non-matching and ambiguous operations are recorded and skipped.
    /// The file is written once, only when at least one operation applied.
    pub fn apply_edits(
        &mut self,
        step_id: &str,
        path: &str,
        edits: &[EditOperation],
    ) -> Result<StepResult> {
        let full = self.root.join(path);
        let original = match read_if_exists(&full) {
            Ok(Some(content)) => content,
            Ok(None) => {
                return Ok(StepResult::failed(step_id, &format!("file not found: {path}")));
            }
            Err(err) => return Ok(StepResult::failed(step_id, &format!("read {path}: {err}"))),
        };

        if edits.is_empty() {
            return Ok(StepResult::skipped(step_id, "no edits to apply"));
        }

        let mut buf = original.clone();
        let mut applied = 0usize;
        let mut issues = Vec::new();
        for (index, edit) in edits.iter().enumerate() {
            match apply_edit(&buf, edit) {
                EditOutcome::Applied(next) => {
                    buf = next;
                    applied += 1;
                }
                EditOutcome::NoMatch => {
                    issues.push(format!("edit {}: no match found", index + 1));
                }
                EditOutcome::Ambiguous(count) => {
                    issues.push(format!(
                        "edit {}: ambiguous match: {count} occurrences",
                        index + 1
                    ));
                }
            }
        }

        if applied == 0 {
            warn!(path, "no edits applied; file untouched");
            return Ok(StepResult::skipped(step_id, &issues.join("; ")));
        }

        // Backup is persisted before the file changes on disk.
        self.backups.capture_once(path, &original, &now_rfc3339())?;
        if let Err(err) = fs::write(&full, &buf) {
            return Ok(StepResult::failed(step_id, &format!("write {path}: {err}")));
        }

        debug!(path, applied, skipped = issues.len(), "edits applied");
        let mut result = StepResult::applied(step_id, Some(unified_diff(path, &original, &buf)));
        if !issues.is_empty() {
            result.error = Some(issues.join("; "));
        }
        Ok(result)
    }

    /// Pre-run content for `path`.
    ///
    /// Fails with [`NoBackupError`] when the path was never mutated in this
    /// run. The backup is kept, so restoration can be repeated.
    pub fn restore(&self, path: &str) -> Result<String> {
        self.backups
            .original_content(path)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::new(NoBackupError {
                    path: path.to_string(),
                })
            })
    }
}

fn read_if_exists(path: &Path) -> std::io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}
