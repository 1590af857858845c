//! Validator seam for the external test runner.
//!
//! The [`Validator`] trait decouples the loop from the actual test command.
//! Tests use scripted validators that return predetermined verdicts without
//! spawning processes.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::state::ValidationResult;
use crate::io::process::{render_log, run_command, truncate_to};

/// Keep verdict detail short; the full log goes to the iteration directory.
const DETAIL_LIMIT_BYTES: usize = 500;

/// Parameters for one validation invocation.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    /// Project root the test command runs in.
    pub workdir: PathBuf,
    /// Override for the configured default command (from `run_test` steps).
    pub command: Option<Vec<String>>,
    /// When set, the full captured output is written here.
    pub log_path: Option<PathBuf>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Abstraction over validation backends.
pub trait Validator {
    fn run(&self, request: &ValidationRequest) -> Result<ValidationResult>;
}

/// Validator that spawns the configured test command.
pub struct CommandValidator {
    pub default_command: Vec<String>,
}

impl Validator for CommandValidator {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn run(&self, request: &ValidationRequest) -> Result<ValidationResult> {
        let argv = request
            .command
            .clone()
            .unwrap_or_else(|| self.default_command.clone());
        debug!(command = ?argv, "running validation command");

        let output = run_command(
            &argv,
            &request.workdir,
            request.timeout,
            request.output_limit_bytes,
        )?;
        let log = render_log(&output, request.output_limit_bytes);
        if let Some(path) = &request.log_path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create log dir {}", parent.display()))?;
            }
            fs::write(path, &log).with_context(|| format!("write {}", path.display()))?;
        }

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "validation timed out");
            return Ok(ValidationResult {
                passed: false,
                detail: format!("validation timed out after {:?}", request.timeout),
            });
        }

        let detail = truncate_to(
            String::from_utf8_lossy(&output.stderr).into_owned()
                + &String::from_utf8_lossy(&output.stdout),
            DETAIL_LIMIT_BYTES,
        );
        Ok(ValidationResult {
            passed: output.success,
            detail,
        })
    }
}
