//! Plan and step types shared by the planner seam and the step executor.
//!
//! These types define the stable contract between the external planner and
//! this core. A [`Plan`] is immutable once issued to the executor; steps run
//! strictly in the order given.

use serde::{Deserialize, Serialize};

/// A single match/replace pair applied to one file's content.
///
/// An edit mutates a file if and only if `match_text` occurs exactly once in
/// the current content. Zero or multiple occurrences is a no-op failure,
/// never a guess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOperation {
    /// Exact substring that must occur exactly once in the current content.
    pub match_text: String,
    /// Text that replaces the matched substring.
    pub replacement_text: String,
}

/// Kind-specific payload of a step.
///
/// The serde tag mirrors the planner wire format (`"kind": "edit_file"`), so
/// dispatch over step kinds is an exhaustive match rather than string
/// comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    /// Write (or overwrite) a whole file.
    CreateFile { path: String, content: String },
    /// Apply an ordered sequence of edits to an existing file.
    EditFile {
        path: String,
        edits: Vec<EditOperation>,
    },
    /// Install a package via an external installer (`pip:<name>`, `npm:<name>`
    /// or a bare name, which defaults to pip).
    InstallPackage { package: String },
    /// Run a web search via an external search client.
    WebSearch { query: String },
    /// Run the test command (or the configured default when `command` is
    /// absent) via the external validator.
    RunTest {
        #[serde(default)]
        command: Option<Vec<String>>,
    },
}

impl StepAction {
    /// File path this action mutates, when it targets one.
    pub fn target_path(&self) -> Option<&str> {
        match self {
            Self::CreateFile { path, .. } | Self::EditFile { path, .. } => Some(path),
            Self::InstallPackage { .. } | Self::WebSearch { .. } | Self::RunTest { .. } => None,
        }
    }

    /// Stable kind name, matching the wire tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateFile { .. } => "create_file",
            Self::EditFile { .. } => "edit_file",
            Self::InstallPackage { .. } => "install_package",
            Self::WebSearch { .. } => "web_search",
            Self::RunTest { .. } => "run_test",
        }
    }
}

/// A single typed unit of work within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(flatten)]
    pub action: StepAction,
}

/// An ordered sequence of steps proposed for one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

/// Check plan-level invariants: every step id non-empty and unique.
///
/// Returns human-readable violations; empty means the plan is well-formed.
pub fn validate_plan(plan: &Plan) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for step in &plan.steps {
        if step.id.trim().is_empty() {
            errors.push("step with empty id".to_string());
        }
        if !seen.insert(step.id.as_str()) {
            errors.push(format!("duplicate step id '{}'", step.id));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_round_trips_through_wire_format() {
        let step = Step {
            id: "s1".to_string(),
            action: StepAction::EditFile {
                path: "src/app.py".to_string(),
                edits: vec![EditOperation {
                    match_text: "version = 1.0".to_string(),
                    replacement_text: "version = 2.0".to_string(),
                }],
            },
        };

        let json = serde_json::to_string(&step).expect("serialize");
        assert!(json.contains("\"kind\":\"edit_file\""));
        let back: Step = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, step);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let raw = r#"{"id":"s1","kind":"delete_file","path":"a.py"}"#;
        assert!(serde_json::from_str::<Step>(raw).is_err());
    }

    #[test]
    fn run_test_command_defaults_to_none() {
        let raw = r#"{"id":"s1","kind":"run_test"}"#;
        let step: Step = serde_json::from_str(raw).expect("deserialize");
        assert_eq!(step.action, StepAction::RunTest { command: None });
    }

    #[test]
    fn validate_plan_flags_duplicate_ids() {
        let plan = Plan {
            steps: vec![
                Step {
                    id: "s1".to_string(),
                    action: StepAction::WebSearch {
                        query: "q".to_string(),
                    },
                },
                Step {
                    id: "s1".to_string(),
                    action: StepAction::RunTest { command: None },
                },
            ],
        };

        let errors = validate_plan(&plan);
        assert!(errors.iter().any(|e| e.contains("duplicate step id")));
    }
}
