//! Test-only scripted collaborators and project fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};

use crate::core::plan::{EditOperation, Plan, Step, StepAction};
use crate::core::state::ValidationResult;
use crate::io::collaborators::{CollabOutcome, Installer, SearchClient};
use crate::io::layout::{InitOptions, init_project};
use crate::io::planner::{PlanRequest, Planner};
use crate::io::validator::{ValidationRequest, Validator};

/// Temporary project directory with `.patchloop/` scaffolding.
pub struct TestProject {
    temp: tempfile::TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        init_project(temp.path(), &InitOptions::default())?;
        Ok(Self { temp })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn write_file(&self, rel: &str, content: &str) {
        let path = self.temp.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    pub fn read_file(&self, rel: &str) -> String {
        fs::read_to_string(self.temp.path().join(rel)).expect("read file")
    }
}

/// Build a plan from steps.
pub fn plan_of(steps: Vec<Step>) -> Plan {
    Plan { steps }
}

pub fn create_file_step(id: &str, path: &str, content: &str) -> Step {
    Step {
        id: id.to_string(),
        action: StepAction::CreateFile {
            path: path.to_string(),
            content: content.to_string(),
        },
    }
}

pub fn edit_file_step(id: &str, path: &str, match_text: &str, replacement_text: &str) -> Step {
    Step {
        id: id.to_string(),
        action: StepAction::EditFile {
            path: path.to_string(),
            edits: vec![EditOperation {
                match_text: match_text.to_string(),
                replacement_text: replacement_text.to_string(),
            }],
        },
    }
}

/// Planner that replays a scripted queue of plans.
pub struct ScriptedPlanner {
    plans: RefCell<VecDeque<Plan>>,
}

impl ScriptedPlanner {
    pub fn new(plans: Vec<Plan>) -> Self {
        Self {
            plans: RefCell::new(plans.into_iter().collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.plans.borrow().len()
    }
}

impl Planner for ScriptedPlanner {
    fn plan(&self, _request: &PlanRequest<'_>) -> Result<Plan> {
        self.plans
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted planner exhausted"))
    }
}

/// Validator that replays a scripted queue of verdicts, then falls back to a
/// fixed default.
pub struct ScriptedValidator {
    verdicts: RefCell<VecDeque<ValidationResult>>,
    default_pass: bool,
}

impl ScriptedValidator {
    pub fn always_passing() -> Self {
        Self {
            verdicts: RefCell::new(VecDeque::new()),
            default_pass: true,
        }
    }

    pub fn always_failing() -> Self {
        Self {
            verdicts: RefCell::new(VecDeque::new()),
            default_pass: false,
        }
    }

    /// `fails` failing verdicts first, passing afterwards.
    pub fn failing_then_passing(fails: usize) -> Self {
        let verdicts = (0..fails)
            .map(|index| ValidationResult {
                passed: false,
                detail: format!("scripted failure {}", index + 1),
            })
            .collect();
        Self {
            verdicts: RefCell::new(verdicts),
            default_pass: true,
        }
    }
}

impl Validator for ScriptedValidator {
    fn run(&self, _request: &ValidationRequest) -> Result<ValidationResult> {
        Ok(self
            .verdicts
            .borrow_mut()
            .pop_front()
            .unwrap_or(ValidationResult {
                passed: self.default_pass,
                detail: if self.default_pass {
                    "ok".to_string()
                } else {
                    "scripted failure".to_string()
                },
            }))
    }
}

/// Installer that records calls and always reports the scripted outcome.
pub struct ScriptedInstaller {
    success: bool,
    calls: RefCell<Vec<String>>,
}

impl ScriptedInstaller {
    pub fn succeeding() -> Self {
        Self {
            success: true,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Installer for ScriptedInstaller {
    fn install(&self, package: &str) -> Result<CollabOutcome> {
        self.calls.borrow_mut().push(package.to_string());
        Ok(CollabOutcome {
            success: self.success,
            detail: "scripted install".to_string(),
        })
    }
}

/// Installer whose handler errors, for fail-soft tests.
pub struct FailingInstaller;

impl Installer for FailingInstaller {
    fn install(&self, _package: &str) -> Result<CollabOutcome> {
        Err(anyhow!("installer unavailable"))
    }
}

/// Search client that records calls and always succeeds.
pub struct ScriptedSearch {
    calls: RefCell<Vec<String>>,
}

impl ScriptedSearch {
    pub fn succeeding() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl SearchClient for ScriptedSearch {
    fn search(&self, query: &str) -> Result<CollabOutcome> {
        self.calls.borrow_mut().push(query.to_string());
        Ok(CollabOutcome {
            success: true,
            detail: "scripted results".to_string(),
        })
    }
}
