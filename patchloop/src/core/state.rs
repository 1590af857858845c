//! Execution state owned by the iteration controller.
//!
//! The controller is the only component that mutates [`ExecutionState`]; the
//! state store serializes it without interpreting it. Once `terminal` is set
//! the state is immutable.

use serde::{Deserialize, Serialize};

use crate::core::plan::Plan;

/// Recorded status of one executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The step's mutation (or collaborator call) took effect.
    Applied,
    /// The step was a safe no-op (no match, ambiguous match, disabled feature).
    Skipped,
    /// The step's handler failed; the file/system was left untouched or the
    /// failure detail explains what happened.
    Failed,
}

/// The recorded outcome of executing one step. Append-only: never mutated
/// after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    /// Unified diff of the mutation, when one was applied to a pre-existing
    /// file. `None` for non-file steps and for files created from scratch.
    pub diff: Option<String>,
    /// Failure or skip detail; also carries partial-skip notes on `applied`
    /// results when some edit operations in the step did not match.
    pub error: Option<String>,
}

impl StepResult {
    pub fn applied(step_id: &str, diff: Option<String>) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Applied,
            diff,
            error: None,
        }
    }

    pub fn skipped(step_id: &str, error: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Skipped,
            diff: None,
            error: Some(error.to_string()),
        }
    }

    pub fn failed(step_id: &str, error: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Failed,
            diff: None,
            error: Some(error.to_string()),
        }
    }
}

/// Verdict from the external validator, produced once per iteration after all
/// steps in its plan have run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub detail: String,
}

/// Full state of one run, persisted after every step for crash resumability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Identifier for the current execution run.
    pub run_id: String,
    /// The user instruction driving this run.
    pub instruction: String,
    /// Current iteration (1-indexed, monotonically non-decreasing, bounded by
    /// `max_iterations`).
    pub iteration_index: u32,
    pub max_iterations: u32,
    /// Ordered, append-only history of every executed step across iterations.
    pub step_history: Vec<StepResult>,
    /// One entry per completed iteration.
    pub validation_history: Vec<ValidationResult>,
    /// Plan currently being executed. Carried in the persisted state so a
    /// crashed or cancelled run resumes without re-planning mid-iteration.
    pub current_plan: Option<Plan>,
    /// Index of the next step to execute within `current_plan`.
    pub current_step: usize,
    /// Once true, the state is immutable and the run can only be inspected.
    pub terminal: bool,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl ExecutionState {
    pub fn new(run_id: &str, instruction: &str, max_iterations: u32, started_at: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            instruction: instruction.to_string(),
            iteration_index: 1,
            max_iterations,
            step_history: Vec::new(),
            validation_history: Vec::new(),
            current_plan: None,
            current_step: 0,
            terminal: false,
            started_at: started_at.to_string(),
            finished_at: None,
        }
    }

    /// Record the plan issued for the current iteration.
    pub fn begin_plan(&mut self, plan: Plan) {
        self.current_plan = Some(plan);
        self.current_step = 0;
    }

    /// Append one step result and advance the in-plan cursor.
    pub fn record_step(&mut self, result: StepResult) {
        self.step_history.push(result);
        self.current_step += 1;
    }

    /// Record the validation verdict for the current iteration and retire the
    /// executed plan.
    pub fn record_validation(&mut self, result: ValidationResult) {
        self.validation_history.push(result);
        self.current_plan = None;
        self.current_step = 0;
    }

    /// Move to the next iteration. The counter only moves forward and never
    /// past `max_iterations`; callers treat the bound as exhaustion.
    pub fn advance_iteration(&mut self) -> Result<(), String> {
        if self.terminal {
            return Err("state is terminal".to_string());
        }
        if self.iteration_index >= self.max_iterations {
            return Err(format!(
                "iteration budget exhausted ({}/{})",
                self.iteration_index, self.max_iterations
            ));
        }
        self.iteration_index += 1;
        Ok(())
    }

    /// Mark the run terminal. All applied mutations stay in place; backups
    /// remain the manual recovery path.
    pub fn finish(&mut self, finished_at: &str) {
        self.terminal = true;
        self.finished_at = Some(finished_at.to_string());
    }

    pub fn count_with_status(&self, status: StepStatus) -> usize {
        self.step_history
            .iter()
            .filter(|result| result.status == status)
            .count()
    }

    /// Human-readable run summary for the CLI.
    pub fn summary(&self) -> String {
        let validations_passed = self
            .validation_history
            .iter()
            .filter(|result| result.passed)
            .count();
        let mut lines = Vec::new();
        lines.push(format!("run: {}", self.run_id));
        lines.push(format!("instruction: {}", self.instruction));
        lines.push(format!(
            "iterations: {}/{}",
            self.iteration_index, self.max_iterations
        ));
        lines.push(format!(
            "steps: {} applied, {} skipped, {} failed",
            self.count_with_status(StepStatus::Applied),
            self.count_with_status(StepStatus::Skipped),
            self.count_with_status(StepStatus::Failed),
        ));
        lines.push(format!(
            "validations: {} passed, {} failed",
            validations_passed,
            self.validation_history.len() - validations_passed,
        ));
        lines.push(format!("terminal: {}", self.terminal));
        lines.join("\n")
    }
}

/// Check state invariants after deserialization.
///
/// Returns human-readable violations; a non-empty list means the persisted
/// record is corrupt and the run must abort.
pub fn validate_invariants(state: &ExecutionState) -> Vec<String> {
    let mut errors = Vec::new();
    if state.iteration_index == 0 {
        errors.push("iteration_index must be 1-indexed".to_string());
    }
    if state.max_iterations == 0 {
        errors.push("max_iterations must be > 0".to_string());
    }
    if state.iteration_index > state.max_iterations {
        errors.push(format!(
            "iteration_index {} exceeds max_iterations {}",
            state.iteration_index, state.max_iterations
        ));
    }
    match &state.current_plan {
        Some(plan) => {
            if state.current_step > plan.len() {
                errors.push(format!(
                    "current_step {} exceeds plan length {}",
                    state.current_step,
                    plan.len()
                ));
            }
            // Every in-plan step already executed must have a history entry.
            if state.current_step > state.step_history.len() {
                errors.push(format!(
                    "current_step {} exceeds step history length {}",
                    state.current_step,
                    state.step_history.len()
                ));
            }
            if state.terminal {
                errors.push("terminal state must not carry an in-flight plan".to_string());
            }
        }
        None => {
            if state.current_step != 0 {
                errors.push("current_step must be 0 without an in-flight plan".to_string());
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::{Step, StepAction};

    fn state() -> ExecutionState {
        ExecutionState::new("run-1", "bump version", 5, "2026-01-01T00:00:00Z")
    }

    fn one_step_plan() -> Plan {
        Plan {
            steps: vec![Step {
                id: "s1".to_string(),
                action: StepAction::RunTest { command: None },
            }],
        }
    }

    #[test]
    fn record_step_appends_and_advances_cursor() {
        let mut state = state();
        state.begin_plan(one_step_plan());
        state.record_step(StepResult::applied("s1", None));

        assert_eq!(state.step_history.len(), 1);
        assert_eq!(state.current_step, 1);
    }

    #[test]
    fn advance_iteration_is_bounded() {
        let mut state = state();
        state.max_iterations = 2;

        state.advance_iteration().expect("1 -> 2");
        assert_eq!(state.iteration_index, 2);
        let err = state.advance_iteration().expect_err("at the bound");
        assert!(err.contains("exhausted"));
        assert_eq!(state.iteration_index, 2);
    }

    #[test]
    fn advance_iteration_refuses_terminal_state() {
        let mut state = state();
        state.finish("2026-01-01T00:10:00Z");
        assert!(state.advance_iteration().is_err());
    }

    #[test]
    fn invariants_reject_cursor_past_plan() {
        let mut state = state();
        state.begin_plan(one_step_plan());
        state.current_step = 2;

        let errors = validate_invariants(&state);
        assert!(errors.iter().any(|e| e.contains("exceeds plan length")));
    }

    #[test]
    fn invariants_reject_cursor_past_step_history() {
        let mut state = state();
        state.begin_plan(Plan {
            steps: vec![
                Step {
                    id: "s1".to_string(),
                    action: StepAction::RunTest { command: None },
                },
                Step {
                    id: "s2".to_string(),
                    action: StepAction::RunTest { command: None },
                },
            ],
        });
        state.current_step = 2; // claims two executed steps, history has none

        let errors = validate_invariants(&state);
        assert!(errors.iter().any(|e| e.contains("exceeds step history length")));
    }

    #[test]
    fn invariants_reject_iteration_past_bound() {
        let mut state = state();
        state.iteration_index = 7;

        let errors = validate_invariants(&state);
        assert!(errors.iter().any(|e| e.contains("exceeds max_iterations")));
    }

    #[test]
    fn summary_counts_statuses() {
        let mut state = state();
        state.begin_plan(one_step_plan());
        state.record_step(StepResult::applied("s1", None));
        state.record_validation(ValidationResult {
            passed: false,
            detail: "1 test failed".to_string(),
        });
        state.step_history.push(StepResult::skipped("s2", "no match found"));

        let summary = state.summary();
        assert!(summary.contains("steps: 1 applied, 1 skipped, 0 failed"));
        assert!(summary.contains("validations: 0 passed, 1 failed"));
    }
}
