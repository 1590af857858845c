//! Persistence for [`ExecutionState`] (`.patchloop/state/state.json`).
//!
//! The store serializes and deserializes; it never interprets the state. A
//! record that cannot be read, parsed, or that violates invariants is fatal:
//! continuing without a trustworthy state record would break crash safety.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::core::state::{ExecutionState, validate_invariants};

/// Load the persisted state, or `None` when no record exists yet.
pub fn load_state_if_exists(path: &Path) -> Result<Option<ExecutionState>> {
    if !path.exists() {
        return Ok(None);
    }
    load_state(path).map(Some)
}

/// Load and invariant-check persisted state.
pub fn load_state(path: &Path) -> Result<ExecutionState> {
    debug!(path = %path.display(), "loading execution state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let state: ExecutionState = serde_json::from_str(&contents)
        .with_context(|| format!("parse state {}", path.display()))?;
    let errors = validate_invariants(&state);
    if !errors.is_empty() {
        bail!(
            "corrupt state {}:\n- {}",
            path.display(),
            errors.join("\n- ")
        );
    }
    debug!(run_id = %state.run_id, iter = state.iteration_index, "execution state loaded");
    Ok(state)
}

/// Atomically write state to disk (temp file + rename).
pub fn write_state(path: &Path, state: &ExecutionState) -> Result<()> {
    debug!(
        path = %path.display(),
        run_id = %state.run_id,
        iter = state.iteration_index,
        steps = state.step_history.len(),
        "writing execution state"
    );
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}
