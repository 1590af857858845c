//! Installer and web-search collaborator seams.
//!
//! The only contract these share with the core: accept a request, return
//! success/failure plus optional detail text. Retry and backoff policy is
//! theirs, not the core's.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, instrument};

use crate::io::process::{run_command, truncate_to};

const DETAIL_LIMIT_BYTES: usize = 500;

/// Outcome of one collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollabOutcome {
    pub success: bool,
    pub detail: String,
}

pub trait Installer {
    fn install(&self, package: &str) -> Result<CollabOutcome>;
}

pub trait SearchClient {
    fn search(&self, query: &str) -> Result<CollabOutcome>;
}

/// Installer that shells out to the package manager named by the payload.
pub struct ProcessInstaller {
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Installer for ProcessInstaller {
    #[instrument(skip(self))]
    fn install(&self, package: &str) -> Result<CollabOutcome> {
        let argv = install_command(package)?;
        debug!(command = ?argv, "installing package");
        let output = run_command(&argv, &self.workdir, self.timeout, self.output_limit_bytes)?;
        Ok(outcome_from(output.success, output.timed_out, &output.stderr, &output.stdout))
    }
}

/// Map `pip:<name>` / `npm:<name>` / bare names to install commands.
///
/// Bare names default to pip, matching the planner payload convention.
fn install_command(package: &str) -> Result<Vec<String>> {
    let (manager, name) = match package.split_once(':') {
        Some((manager, name)) => (manager, name),
        None => ("pip", package),
    };
    if name.trim().is_empty() {
        return Err(anyhow!("empty package name in '{package}'"));
    }
    match manager {
        "pip" => Ok(vec![
            "pip".to_string(),
            "install".to_string(),
            name.to_string(),
        ]),
        "npm" => Ok(vec![
            "npm".to_string(),
            "install".to_string(),
            name.to_string(),
        ]),
        other => Err(anyhow!("unknown package manager '{other}'")),
    }
}

/// Search client that appends the query to a configured command.
pub struct ProcessSearchClient {
    pub command: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl SearchClient for ProcessSearchClient {
    #[instrument(skip(self))]
    fn search(&self, query: &str) -> Result<CollabOutcome> {
        if self.command.is_empty() {
            return Err(anyhow!("search command not configured"));
        }
        let mut argv = self.command.clone();
        argv.push(query.to_string());
        debug!(command = ?argv, "running web search");
        let output = run_command(&argv, &self.workdir, self.timeout, self.output_limit_bytes)?;
        Ok(outcome_from(output.success, output.timed_out, &output.stderr, &output.stdout))
    }
}

fn outcome_from(success: bool, timed_out: bool, stderr: &[u8], stdout: &[u8]) -> CollabOutcome {
    if timed_out {
        return CollabOutcome {
            success: false,
            detail: "command timed out".to_string(),
        };
    }
    let source = if success { stdout } else { stderr };
    CollabOutcome {
        success,
        detail: truncate_to(String::from_utf8_lossy(source).into_owned(), DETAIL_LIMIT_BYTES),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pip_prefix_maps_to_pip_install() {
        let argv = install_command("pip:requests").expect("command");
        assert_eq!(argv, vec!["pip", "install", "requests"]);
    }

    #[test]
    fn npm_prefix_maps_to_npm_install() {
        let argv = install_command("npm:axios").expect("command");
        assert_eq!(argv, vec!["npm", "install", "axios"]);
    }

    #[test]
    fn bare_name_defaults_to_pip() {
        let argv = install_command("flask").expect("command");
        assert_eq!(argv, vec!["pip", "install", "flask"]);
    }

    #[test]
    fn unknown_manager_is_rejected() {
        let err = install_command("cargo:serde").expect_err("unknown manager");
        assert!(err.to_string().contains("unknown package manager"));
    }

    #[test]
    fn empty_package_name_is_rejected() {
        assert!(install_command("pip:").is_err());
    }
}
