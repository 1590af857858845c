//! Iterative plan-and-patch loop for autonomous code modification.
//!
//! Manages run state (`.patchloop/state/state.json`) for a bounded loop that
//! plans, applies file patches, and validates until the test command passes
//! or the iteration budget runs out. Runs are resumable: re-invoking `run`
//! with the same instruction picks up where the last invocation stopped.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use patchloop::core::state::StepStatus;
use patchloop::exit_codes;
use patchloop::io::backup_store::BackupStore;
use patchloop::io::collaborators::{ProcessInstaller, ProcessSearchClient};
use patchloop::io::config::load_config;
use patchloop::io::layout::{InitOptions, ProjectPaths, init_project};
use patchloop::io::patcher::Patcher;
use patchloop::io::planner::ProcessPlanner;
use patchloop::io::state_store::{load_state, load_state_if_exists};
use patchloop::io::validator::CommandValidator;
use patchloop::looping::{LoopStop, run_loop};

#[derive(Parser)]
#[command(
    name = "patchloop",
    version,
    about = "Bounded plan-and-patch loop for autonomous code modification"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.patchloop/` scaffolding and a default config if missing.
    Init {
        /// Overwrite existing config and gitignore.
        #[arg(short, long)]
        force: bool,
        /// Project root to scaffold.
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
    /// Run the loop for an instruction until validation passes or the budget
    /// is exhausted.
    Run {
        /// Natural-language goal handed to the planner verbatim.
        instruction: String,
        /// Project root to operate on.
        #[arg(long, default_value = ".")]
        project: PathBuf,
        /// Override the configured iteration budget.
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Record `install_package` steps as skipped instead of running them.
        #[arg(long)]
        no_install: bool,
        /// Record `web_search` steps as skipped instead of running them.
        #[arg(long)]
        no_search: bool,
    },
    /// Restore a file to its pre-run content from the run's backup records.
    Restore {
        /// Project-relative path to restore.
        path: String,
        /// Project root to operate on.
        #[arg(long, default_value = ".")]
        project: PathBuf,
        /// Run to restore from. Defaults to the most recent run.
        #[arg(long)]
        run: Option<String>,
    },
    /// Print a summary of the persisted run state.
    State {
        /// Project root to inspect.
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
}

fn main() {
    patchloop::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, project } => cmd_init(&project, force),
        Command::Run {
            instruction,
            project,
            max_iterations,
            no_install,
            no_search,
        } => cmd_run(&project, &instruction, max_iterations, no_install, no_search),
        Command::Restore { path, project, run } => cmd_restore(&project, &path, run.as_deref()),
        Command::State { project } => cmd_state(&project),
    }
}

fn cmd_init(project: &Path, force: bool) -> Result<i32> {
    let paths = init_project(project, &InitOptions { force })?;
    println!("initialized {}", paths.patchloop_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_run(
    project: &Path,
    instruction: &str,
    max_iterations: Option<u32>,
    no_install: bool,
    no_search: bool,
) -> Result<i32> {
    let paths = init_project(project, &InitOptions::default())?;
    let mut config = load_config(&paths.config_path)?;
    if let Some(budget) = max_iterations {
        config.max_iterations = budget;
    }
    if no_install {
        config.enable_auto_install = false;
    }
    if no_search {
        config.enable_web_search = false;
    }

    let timeout = Duration::from_secs(config.collaborator_timeout_secs);
    let planner = ProcessPlanner {
        command: config.planner.command.clone(),
        timeout,
        output_limit_bytes: config.output_limit_bytes,
    };
    let validator = CommandValidator {
        default_command: config.validator.command.clone(),
    };
    let installer = ProcessInstaller {
        workdir: paths.root.clone(),
        timeout,
        output_limit_bytes: config.output_limit_bytes,
    };
    let search = ProcessSearchClient {
        command: config.search.command.clone(),
        workdir: paths.root.clone(),
        timeout,
        output_limit_bytes: config.output_limit_bytes,
    };

    let outcome = run_loop(
        &paths.root,
        instruction,
        &planner,
        &validator,
        &installer,
        &search,
        &config,
        |step, result| {
            let note = match result.status {
                StepStatus::Applied => "applied",
                StepStatus::Skipped => "skipped",
                StepStatus::Failed => "failed",
            };
            println!("step {}: {} {}", step.id, step.action.kind(), note);
        },
    )?;

    let state = load_state(&paths.state_path)?;
    println!("{}", state.summary());
    match outcome.stop {
        LoopStop::Success { iterations } => {
            println!("validation passed after {iterations} iteration(s)");
            Ok(exit_codes::OK)
        }
        LoopStop::Exhausted {
            iterations,
            max_iterations,
        } => {
            println!(
                "iteration budget exhausted ({iterations}/{max_iterations}); \
                 applied changes left in place, see `patchloop restore`"
            );
            Ok(exit_codes::EXHAUSTED)
        }
    }
}

fn cmd_restore(project: &Path, path: &str, run: Option<&str>) -> Result<i32> {
    let paths = ProjectPaths::new(project);
    let run_id = match run {
        Some(id) => id.to_string(),
        None => match load_state_if_exists(&paths.state_path)? {
            Some(state) => state.run_id,
            None => bail!("no persisted run; pass --run to name a backup set"),
        },
    };

    let backups = BackupStore::open(&paths.backup_path(&run_id))?;
    let patcher = Patcher::new(&paths.root, backups);
    let original = patcher.restore(path)?;
    let target = paths.root.join(path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(&target, original).with_context(|| format!("write {}", target.display()))?;
    println!("restored {path} from run {run_id}");
    Ok(exit_codes::OK)
}

fn cmd_state(project: &Path) -> Result<i32> {
    let paths = ProjectPaths::new(project);
    match load_state_if_exists(&paths.state_path)? {
        Some(state) => {
            println!("{}", state.summary());
            Ok(exit_codes::OK)
        }
        None => {
            println!("no persisted run");
            Ok(exit_codes::OK)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["patchloop", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false, .. }));
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "patchloop",
            "run",
            "fix the tests",
            "--max-iterations",
            "3",
            "--no-search",
        ]);
        match cli.command {
            Command::Run {
                instruction,
                max_iterations,
                no_install,
                no_search,
                ..
            } => {
                assert_eq!(instruction, "fix the tests");
                assert_eq!(max_iterations, Some(3));
                assert!(!no_install);
                assert!(no_search);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn parse_restore_with_run() {
        let cli = Cli::parse_from(["patchloop", "restore", "src/app.py", "--run", "run-x"]);
        match cli.command {
            Command::Restore { path, run, .. } => {
                assert_eq!(path, "src/app.py");
                assert_eq!(run.as_deref(), Some("run-x"));
            }
            _ => panic!("expected restore command"),
        }
    }
}
