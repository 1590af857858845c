//! The bounded plan → execute → validate loop.
//!
//! One iteration: request a plan from the external planner, feed each step to
//! the step executor in order, run validation once, then decide whether to
//! continue, stop successfully, or stop exhausted. The full execution state
//! is persisted after every single step, so a cancelled or crashed run
//! resumes from the last fully-recorded step without re-executing completed
//! steps or losing backups.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, warn};

use crate::core::plan::{Plan, Step};
use crate::core::state::{ExecutionState, StepResult};
use crate::executor::{ExecPolicy, StepExecutor};
use crate::io::backup_store::BackupStore;
use crate::io::collaborators::{Installer, SearchClient};
use crate::io::config::AgentConfig;
use crate::io::iteration_log::{IterationPaths, write_plan, write_results};
use crate::io::layout::{ProjectPaths, generate_run_id, now_rfc3339};
use crate::io::patcher::Patcher;
use crate::io::planner::{PlanRequest, Planner};
use crate::io::state_store::{load_state_if_exists, write_state};
use crate::io::validator::{ValidationRequest, Validator};

/// Reason why the loop stopped. Both variants are terminal: the loop is never
/// silently retried past them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// Validation passed, or the planner had nothing left to do.
    Success { iterations: u32 },
    /// The iteration budget ran out with validation still failing. Applied
    /// mutations stay in place; backups are the manual recovery path.
    Exhausted { iterations: u32, max_iterations: u32 },
}

/// Summary of one loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub run_id: String,
    pub steps_executed: u32,
    pub stop: LoopStop,
}

/// Run the iteration loop for `instruction` until validation passes or the
/// iteration budget is exhausted.
///
/// Stops immediately on structural errors (state/backup store I/O, corrupt
/// persisted state, planner contract violations).
#[allow(clippy::too_many_arguments)]
pub fn run_loop<P, V, I, S, F>(
    root: &Path,
    instruction: &str,
    planner: &P,
    validator: &V,
    installer: &I,
    search: &S,
    config: &AgentConfig,
    mut on_step: F,
) -> Result<LoopOutcome>
where
    P: Planner,
    V: Validator,
    I: Installer,
    S: SearchClient,
    F: FnMut(&Step, &StepResult),
{
    config.validate()?;
    let paths = ProjectPaths::new(root);
    let mut state = open_run(&paths, instruction, config)?;
    let run_id = state.run_id.clone();
    info!(run_id = %run_id, iter = state.iteration_index, "run loop starting");

    let backups = BackupStore::open(&paths.backup_path(&run_id))?;
    let mut patcher = Patcher::new(root, backups);
    let policy = ExecPolicy::from_config(root, config);
    let mut executor = StepExecutor::new(&mut patcher, installer, search, validator, policy);

    let mut steps_executed = 0u32;
    loop {
        let iter = state.iteration_index;
        let iteration = IterationPaths::new(&paths, &run_id, iter);
        executor.set_step_log_dir(iteration.dir.clone());

        // Planning. A persisted in-flight plan means this invocation resumes
        // a cancelled or crashed iteration and must not re-plan.
        let plan = match state.current_plan.clone() {
            Some(plan) => {
                info!(iter, resumed_at_step = state.current_step, "resuming in-flight plan");
                plan
            }
            None => {
                let plan = planner
                    .plan(&PlanRequest {
                        project_root: root,
                        instruction: &state.instruction,
                        state: &state,
                    })
                    .with_context(|| format!("plan iteration {iter}"))?;
                write_plan(&iteration, &plan)?;
                if plan.is_empty() {
                    info!(iter, "planner returned an empty plan; nothing left to do");
                    state.finish(&now_rfc3339());
                    write_state(&paths.state_path, &state)?;
                    return Ok(LoopOutcome {
                        run_id,
                        steps_executed,
                        stop: LoopStop::Success { iterations: iter },
                    });
                }
                state.begin_plan(plan.clone());
                write_state(&paths.state_path, &state)?;
                plan
            }
        };

        // Executing: strictly sequential, one step fully recorded and
        // persisted before the next begins.
        let history_start = state.step_history.len() - state.current_step;
        while state.current_step < plan.len() {
            let step = &plan.steps[state.current_step];
            let result = executor.execute(step)?;
            on_step(step, &result);
            steps_executed += 1;
            state.record_step(result);
            write_state(&paths.state_path, &state)?;
        }

        // Validating: once per iteration, after the whole plan has run.
        let verdict = validator
            .run(&ValidationRequest {
                workdir: root.to_path_buf(),
                command: None,
                log_path: Some(iteration.validation_log_path.clone()),
                timeout: Duration::from_secs(config.collaborator_timeout_secs),
                output_limit_bytes: config.output_limit_bytes,
            })
            .with_context(|| format!("validate iteration {iter}"))?;
        debug!(iter, passed = verdict.passed, "validation finished");
        let passed = verdict.passed;
        state.record_validation(verdict);
        write_results(&iteration, &state.step_history[history_start..], &state)?;

        if passed {
            info!(iter, "validation passed");
            state.finish(&now_rfc3339());
            write_state(&paths.state_path, &state)?;
            return Ok(LoopOutcome {
                run_id,
                steps_executed,
                stop: LoopStop::Success { iterations: iter },
            });
        }

        if state.iteration_index >= state.max_iterations {
            warn!(
                iter,
                max_iterations = state.max_iterations,
                "iteration budget exhausted with validation failing"
            );
            state.finish(&now_rfc3339());
            write_state(&paths.state_path, &state)?;
            return Ok(LoopOutcome {
                run_id,
                steps_executed,
                stop: LoopStop::Exhausted {
                    iterations: iter,
                    max_iterations: state.max_iterations,
                },
            });
        }

        state
            .advance_iteration()
            .map_err(|err| anyhow!("advance iteration: {err}"))?;
        write_state(&paths.state_path, &state)?;
    }
}

/// Load the persisted run for resume, or start a fresh one.
///
/// A terminal record belongs to a finished run and is left untouched; a new
/// run id is allocated. A non-terminal record with a different instruction is
/// an in-flight run we refuse to clobber.
fn open_run(
    paths: &ProjectPaths,
    instruction: &str,
    config: &AgentConfig,
) -> Result<ExecutionState> {
    let state = match load_state_if_exists(&paths.state_path)? {
        Some(state) if !state.terminal => {
            if state.instruction != instruction {
                bail!(
                    "a run for a different instruction is in flight ({}); \
                     finish or remove {} first",
                    state.run_id,
                    paths.state_path.display()
                );
            }
            info!(run_id = %state.run_id, "resuming persisted run");
            state
        }
        _ => {
            let run_id = generate_run_id();
            info!(run_id = %run_id, "starting new run");
            ExecutionState::new(&run_id, instruction, config.max_iterations, &now_rfc3339())
        }
    };
    write_state(&paths.state_path, &state)?;
    Ok(state)
}
