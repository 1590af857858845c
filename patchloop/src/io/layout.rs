//! On-disk layout for `.patchloop/` project scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::debug;

use crate::io::config::{AgentConfig, write_config};

const GITIGNORE_BODY: &str = "iterations/\nbackups/\n";

/// Resolved paths under a project root.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub patchloop_dir: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub state_path: PathBuf,
    pub backups_dir: PathBuf,
    pub iterations_dir: PathBuf,
    pub gitignore_path: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: &Path) -> Self {
        let patchloop_dir = root.join(".patchloop");
        let state_dir = patchloop_dir.join("state");
        Self {
            root: root.to_path_buf(),
            config_path: state_dir.join("config.toml"),
            state_path: state_dir.join("state.json"),
            backups_dir: patchloop_dir.join("backups"),
            iterations_dir: patchloop_dir.join("iterations"),
            gitignore_path: patchloop_dir.join(".gitignore"),
            patchloop_dir,
            state_dir,
        }
    }

    /// Backup record file for one run.
    pub fn backup_path(&self, run_id: &str) -> PathBuf {
        self.backups_dir.join(format!("{run_id}.json"))
    }

    /// Audit artifact directory for one iteration of one run.
    pub fn iteration_dir(&self, run_id: &str, iter: u32) -> PathBuf {
        self.iterations_dir.join(run_id).join(iter.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Overwrite existing scaffolding files.
    pub force: bool,
}

/// Create `.patchloop/` scaffolding: state dir, default config, gitignore.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<ProjectPaths> {
    let paths = ProjectPaths::new(root);
    debug!(root = %root.display(), "initializing project scaffolding");

    for dir in [
        &paths.patchloop_dir,
        &paths.state_dir,
        &paths.backups_dir,
        &paths.iterations_dir,
    ] {
        fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    }

    if options.force || !paths.config_path.exists() {
        write_config(&paths.config_path, &AgentConfig::default())?;
    }
    if options.force || !paths.gitignore_path.exists() {
        fs::write(&paths.gitignore_path, GITIGNORE_BODY)
            .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
    }

    Ok(paths)
}

/// Current wall-clock time as an RFC 3339 string (second precision, UTC).
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Generate a run id from the current UTC time.
///
/// Single-run-per-project is assumed, so second precision is enough to keep
/// ids unique in practice.
pub fn generate_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%d-%H%M%S"))
}
