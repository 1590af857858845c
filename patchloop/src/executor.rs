//! Step execution: maps each plan step to its handler.
//!
//! Dispatch over [`StepAction`] is an exhaustive match. Handler failures are
//! converted into `failed` step results, never propagated, so one bad step
//! cannot abort the remaining steps of a plan (fail-soft within a plan). The
//! only exception is the patcher's backup persistence, whose failure is
//! structural and bubbles up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::core::plan::{Step, StepAction};
use crate::core::state::StepResult;
use crate::io::collaborators::{CollabOutcome, Installer, SearchClient};
use crate::io::config::AgentConfig;
use crate::io::patcher::Patcher;
use crate::io::validator::{ValidationRequest, Validator};

/// Execution policy derived from config: which collaborators are enabled and
/// how long they may run.
#[derive(Debug, Clone)]
pub struct ExecPolicy {
    pub project_root: PathBuf,
    pub enable_auto_install: bool,
    pub enable_web_search: bool,
    pub collaborator_timeout: Duration,
    pub output_limit_bytes: usize,
}

impl ExecPolicy {
    pub fn from_config(root: &Path, config: &AgentConfig) -> Self {
        Self {
            project_root: root.to_path_buf(),
            enable_auto_install: config.enable_auto_install,
            enable_web_search: config.enable_web_search,
            collaborator_timeout: Duration::from_secs(config.collaborator_timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

/// Routes each step kind to its handler and records one result per step.
pub struct StepExecutor<'a, I: Installer, S: SearchClient, V: Validator> {
    patcher: &'a mut Patcher,
    installer: &'a I,
    search: &'a S,
    validator: &'a V,
    policy: ExecPolicy,
    /// Audit directory for the current iteration; `run_test` steps write
    /// their full command output here.
    step_log_dir: Option<PathBuf>,
}

impl<'a, I: Installer, S: SearchClient, V: Validator> StepExecutor<'a, I, S, V> {
    pub fn new(
        patcher: &'a mut Patcher,
        installer: &'a I,
        search: &'a S,
        validator: &'a V,
        policy: ExecPolicy,
    ) -> Self {
        Self {
            patcher,
            installer,
            search,
            validator,
            policy,
            step_log_dir: None,
        }
    }

    /// Point `run_test` step logs at the given iteration directory.
    pub fn set_step_log_dir(&mut self, dir: PathBuf) {
        self.step_log_dir = Some(dir);
    }

    /// Execute one step. `Err` here means a structural failure; everything a
    /// handler can get wrong comes back as a `failed` or `skipped` result.
    pub fn execute(&mut self, step: &Step) -> Result<StepResult> {
        let result = match &step.action {
            StepAction::CreateFile { path, content } => {
                self.patcher.write_file(&step.id, path, content)?
            }
            StepAction::EditFile { path, edits } => {
                self.patcher.apply_edits(&step.id, path, edits)?
            }
            StepAction::InstallPackage { package } => {
                if self.policy.enable_auto_install {
                    self.collab_result(&step.id, self.installer.install(package))
                } else {
                    StepResult::skipped(&step.id, "package installation disabled")
                }
            }
            StepAction::WebSearch { query } => {
                if self.policy.enable_web_search {
                    self.collab_result(&step.id, self.search.search(query))
                } else {
                    StepResult::skipped(&step.id, "web search disabled")
                }
            }
            StepAction::RunTest { command } => {
                let request = ValidationRequest {
                    workdir: self.policy.project_root.clone(),
                    command: command.clone(),
                    log_path: self
                        .step_log_dir
                        .as_ref()
                        .map(|dir| dir.join(format!("step-{}.log", step.id))),
                    timeout: self.policy.collaborator_timeout,
                    output_limit_bytes: self.policy.output_limit_bytes,
                };
                match self.validator.run(&request) {
                    Ok(verdict) if verdict.passed => StepResult::applied(&step.id, None),
                    Ok(verdict) => StepResult::failed(&step.id, &verdict.detail),
                    Err(err) => StepResult::failed(&step.id, &format!("{err:#}")),
                }
            }
        };
        debug!(step = %step.id, kind = step.action.kind(), status = ?result.status, "step executed");
        Ok(result)
    }

    fn collab_result(&self, step_id: &str, outcome: Result<CollabOutcome>) -> StepResult {
        match outcome {
            Ok(outcome) if outcome.success => StepResult::applied(step_id, None),
            Ok(outcome) => StepResult::failed(step_id, &outcome.detail),
            Err(err) => StepResult::failed(step_id, &format!("{err:#}")),
        }
    }
}
