//! Agent configuration stored under `.patchloop/state/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Agent configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Iteration budget for one run; the loop never exceeds it.
    pub max_iterations: u32,

    /// Route `install_package` steps to the installer. When false those steps
    /// are recorded as skipped.
    pub enable_auto_install: bool,

    /// Route `web_search` steps to the search client. When false those steps
    /// are recorded as skipped.
    pub enable_web_search: bool,

    /// Wall-clock bound for one collaborator invocation (planner, validator,
    /// installer, search).
    pub collaborator_timeout_secs: u64,

    /// Truncate collaborator stdout/stderr logs beyond this many bytes.
    pub output_limit_bytes: usize,

    pub planner: PlannerConfig,
    pub validator: ValidatorConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Command that receives a JSON plan request on stdin and emits a JSON
    /// plan on stdout.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Default test command; `run_test` steps may override it.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    /// Search command; the query is appended as the final argument.
    pub command: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            command: vec!["planner".to_string()],
        }
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            command: vec!["pytest".to_string()],
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            command: vec!["ddgr".to_string(), "--json".to_string()],
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            enable_auto_install: true,
            enable_web_search: true,
            collaborator_timeout_secs: 5 * 60,
            output_limit_bytes: 100_000,
            planner: PlannerConfig::default(),
            validator: ValidatorConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.collaborator_timeout_secs == 0 {
            return Err(anyhow!("collaborator_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        ensure_command("planner.command", &self.planner.command)?;
        ensure_command("validator.command", &self.validator.command)?;
        if self.enable_web_search {
            ensure_command("search.command", &self.search.command)?;
        }
        Ok(())
    }
}

fn ensure_command(name: &str, command: &[String]) -> Result<()> {
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(anyhow!("{name} must be a non-empty array"));
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = AgentConfig {
            max_iterations: 3,
            enable_web_search: false,
            ..AgentConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn zero_iteration_budget_is_rejected() {
        let cfg = AgentConfig {
            max_iterations: 0,
            ..AgentConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_planner_command_is_rejected() {
        let cfg = AgentConfig {
            planner: PlannerConfig {
                command: Vec::new(),
            },
            ..AgentConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn disabled_search_tolerates_empty_search_command() {
        let cfg = AgentConfig {
            enable_web_search: false,
            search: SearchConfig {
                command: Vec::new(),
            },
            ..AgentConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }
}
