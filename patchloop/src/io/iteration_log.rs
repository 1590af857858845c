//! Per-iteration audit artifacts under `.patchloop/iterations/`.
//!
//! Always written, unaffected by `RUST_LOG`; these are product artifacts for
//! diagnosing a run after the fact, not dev tracing.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::plan::Plan;
use crate::core::state::{ExecutionState, StepResult};
use crate::io::layout::ProjectPaths;

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub plan_path: PathBuf,
    pub steps_path: PathBuf,
    pub validation_log_path: PathBuf,
    pub state_after_path: PathBuf,
}

impl IterationPaths {
    pub fn new(paths: &ProjectPaths, run_id: &str, iter: u32) -> Self {
        let dir = paths.iteration_dir(run_id, iter);
        Self {
            plan_path: dir.join("plan.json"),
            steps_path: dir.join("steps.json"),
            validation_log_path: dir.join("validation.log"),
            state_after_path: dir.join("state.after.json"),
            dir,
        }
    }
}

/// Record the plan issued for this iteration.
pub fn write_plan(paths: &IterationPaths, plan: &Plan) -> Result<()> {
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;
    write_json(&paths.plan_path, plan)
}

/// Record this iteration's step results and the state snapshot after it.
pub fn write_results(
    paths: &IterationPaths,
    steps: &[StepResult],
    state: &ExecutionState,
) -> Result<()> {
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;
    write_json(&paths.steps_path, &steps)?;
    write_json(&paths.state_after_path, state)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_paths_are_stable() {
        let paths = ProjectPaths::new(Path::new("/tmp/project"));
        let iteration = IterationPaths::new(&paths, "run-1", 3);

        assert!(iteration.dir.ends_with(Path::new(".patchloop/iterations/run-1/3")));
        assert!(iteration.plan_path.ends_with("plan.json"));
        assert!(iteration.steps_path.ends_with("steps.json"));
        assert!(iteration.validation_log_path.ends_with("validation.log"));
        assert!(iteration.state_after_path.ends_with("state.after.json"));
    }

    #[test]
    fn writes_plan_and_results() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        let iteration = IterationPaths::new(&paths, "run-9", 1);

        let plan = Plan::default();
        write_plan(&iteration, &plan).expect("write plan");

        let state = ExecutionState::new("run-9", "x", 5, "2026-01-01T00:00:00Z");
        write_results(&iteration, &[StepResult::applied("s1", None)], &state)
            .expect("write results");

        assert!(iteration.plan_path.is_file());
        assert!(iteration.steps_path.is_file());
        assert!(iteration.state_after_path.is_file());
    }
}
