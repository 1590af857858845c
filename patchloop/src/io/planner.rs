//! Planner seam: requesting a plan from the external planning agent.
//!
//! The [`Planner`] trait decouples the loop from the planning backend. The
//! process-backed implementation feeds the instruction plus the cumulative
//! execution state to a configured command and parses its stdout as a plan,
//! validated against the bundled JSON Schema before any step executes.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::plan::{Plan, validate_plan};
use crate::core::state::ExecutionState;
use crate::io::process::{run_command_with_input, truncate_to};

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

/// Parameters for one planning request.
#[derive(Debug)]
pub struct PlanRequest<'a> {
    pub project_root: &'a Path,
    pub instruction: &'a str,
    /// Cumulative state, so the planner can see prior step failures and
    /// validation verdicts when refining its plan.
    pub state: &'a ExecutionState,
}

/// Abstraction over planning backends.
pub trait Planner {
    /// Produce a well-formed, possibly empty, ordered plan.
    fn plan(&self, request: &PlanRequest<'_>) -> Result<Plan>;
}

/// Planner that spawns a configured command.
pub struct ProcessPlanner {
    pub command: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Planner for ProcessPlanner {
    #[instrument(skip_all, fields(iter = request.state.iteration_index))]
    fn plan(&self, request: &PlanRequest<'_>) -> Result<Plan> {
        let payload = serde_json::json!({
            "instruction": request.instruction,
            "state": request.state,
        });
        let input = serde_json::to_vec(&payload).context("serialize plan request")?;

        let output = run_command_with_input(
            &self.command,
            request.project_root,
            Some(&input),
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run planner command")?;
        if output.timed_out {
            bail!("planner timed out after {:?}", self.timeout);
        }
        if !output.success {
            bail!(
                "planner failed: {}",
                truncate_to(
                    String::from_utf8_lossy(&output.stderr).into_owned(),
                    self.output_limit_bytes
                )
            );
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let plan = parse_plan(&text)?;
        debug!(steps = plan.len(), "plan received");
        Ok(plan)
    }
}

/// Parse raw planner output into a validated [`Plan`].
///
/// Tolerates a markdown code fence around the JSON, since LLM-backed planners
/// routinely wrap their output in one.
pub fn parse_plan(raw: &str) -> Result<Plan> {
    let raw = strip_code_fence(raw.trim());
    let value: Value = serde_json::from_str(raw).context("parse plan json")?;
    validate_plan_schema(&value)?;
    let plan: Plan = serde_json::from_value(value).context("parse plan as typed steps")?;
    let errors = validate_plan(&plan);
    if !errors.is_empty() {
        bail!("invalid plan:\n- {}", errors.join("\n- "));
    }
    Ok(plan)
}

fn strip_code_fence(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix("```") else {
        return raw;
    };
    // Drop the fence line (which may carry a language tag) and the closing fence.
    let body = match rest.split_once('\n') {
        Some((_tag, body)) => body,
        None => return raw,
    };
    body.trim_end()
        .strip_suffix("```")
        .map(str::trim_end)
        .unwrap_or(body)
}

/// Validate a plan instance against the bundled JSON Schema (Draft 2020-12).
fn validate_plan_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).context("parse plan schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile plan schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!(
            "plan schema validation failed:\n- {}",
            messages.join("\n- ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::StepAction;

    #[test]
    fn parses_a_minimal_plan() {
        let raw = r#"{"steps":[{"id":"s1","kind":"run_test"}]}"#;
        let plan = parse_plan(raw).expect("parse");
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps[0].action, StepAction::RunTest { command: None });
    }

    #[test]
    fn parses_an_empty_plan() {
        let plan = parse_plan(r#"{"steps":[]}"#).expect("parse");
        assert!(plan.is_empty());
    }

    #[test]
    fn strips_markdown_code_fence() {
        let raw = "```json\n{\"steps\":[{\"id\":\"s1\",\"kind\":\"web_search\",\"query\":\"rust serde\"}]}\n```";
        let plan = parse_plan(raw).expect("parse");
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn rejects_unknown_step_kind() {
        let raw = r#"{"steps":[{"id":"s1","kind":"delete_file","path":"a.py"}]}"#;
        let err = parse_plan(raw).expect_err("unknown kind");
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[test]
    fn rejects_edit_step_without_edits() {
        let raw = r#"{"steps":[{"id":"s1","kind":"edit_file","path":"a.py"}]}"#;
        assert!(parse_plan(raw).is_err());
    }

    #[test]
    fn rejects_duplicate_step_ids() {
        let raw = r#"{"steps":[
            {"id":"s1","kind":"run_test"},
            {"id":"s1","kind":"web_search","query":"q"}
        ]}"#;
        let err = parse_plan(raw).expect_err("duplicate ids");
        assert!(err.to_string().contains("duplicate step id"));
    }
}
