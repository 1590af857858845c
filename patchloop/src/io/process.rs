//! Process spawning with a wall-clock bound and captured output.
//!
//! stdout and stderr are drained on dedicated threads while the child runs,
//! so a chatty child never blocks on a full pipe. `output_limit_bytes` bounds
//! the bytes kept in memory; bytes beyond it are discarded while still
//! draining the pipe.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Captured result of one bounded command invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub timed_out: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes of stdout discarded past the output limit.
    pub stdout_truncated: usize,
    /// Bytes of stderr discarded past the output limit.
    pub stderr_truncated: usize,
}

/// Run `argv` in `workdir`, killing it after `timeout`.
pub fn run_command(
    argv: &[String],
    workdir: &Path,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    run_command_with_input(argv, workdir, None, timeout, output_limit_bytes)
}

/// Run `argv`, optionally feeding `input` on stdin.
pub fn run_command_with_input(
    argv: &[String],
    workdir: &Path,
    input: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(workdir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn {program}"))?;

    if let Some(bytes) = input {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("missing stdin pipe for {program}"))?;
        stdin
            .write_all(bytes)
            .with_context(|| format!("write stdin of {program}"))?;
        // Dropping the handle closes the pipe so the child sees EOF.
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("missing stdout pipe for {program}"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("missing stderr pipe for {program}"))?;

    // Drain both pipes concurrently with the wait so the child can never
    // block on a full pipe buffer.
    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child
        .wait_timeout(timeout)
        .with_context(|| format!("wait for {program}"))?
    {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), %program, "command timed out, killing");
            timed_out = true;
            child.kill().with_context(|| format!("kill {program}"))?;
            child.wait().with_context(|| format!("reap {program}"))?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout reader")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr reader")?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        success: !timed_out && status.success(),
        timed_out,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Drain `reader` to EOF, keeping at most `limit` bytes.
fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n - keep;
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

/// Render captured output as a log body, truncated to `output_limit` bytes.
pub fn render_log(output: &CommandOutput, output_limit: usize) -> String {
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    if output.stdout_truncated > 0 {
        buf.push_str(&format!("\n[stdout truncated {} bytes]\n", output.stdout_truncated));
    }
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    if output.stderr_truncated > 0 {
        buf.push_str(&format!("\n[stderr truncated {} bytes]\n", output.stderr_truncated));
    }
    if output.timed_out {
        buf.push_str("\n[command timed out]\n");
    }
    truncate_to(buf, output_limit)
}

/// Truncate on a char boundary, appending a note with the dropped byte count.
pub fn truncate_to(text: String, limit: usize) -> String {
    if text.len() <= limit {
        return text;
    }
    let mut cut = limit;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\n[truncated {} bytes]\n", &text[..cut], text.len() - cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 1_000_000;

    #[test]
    fn empty_command_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = run_command(&[], temp.path(), Duration::from_secs(1), LIMIT).expect_err("empty");
        assert!(err.to_string().contains("empty command"));
    }

    #[test]
    fn captures_stdout_of_a_successful_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let argv = vec!["echo".to_string(), "hello".to_string()];
        let output = run_command(&argv, temp.path(), Duration::from_secs(5), LIMIT).expect("run");

        assert!(output.success);
        assert!(!output.timed_out);
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[test]
    fn input_is_fed_on_stdin() {
        let temp = tempfile::tempdir().expect("tempdir");
        let argv = vec!["cat".to_string()];
        let output = run_command_with_input(
            &argv,
            temp.path(),
            Some(b"piped input"),
            Duration::from_secs(5),
            LIMIT,
        )
        .expect("run");

        assert!(output.success);
        assert_eq!(String::from_utf8_lossy(&output.stdout), "piped input");
    }

    #[test]
    fn slow_command_times_out() {
        let temp = tempfile::tempdir().expect("tempdir");
        let argv = vec!["sleep".to_string(), "5".to_string()];
        let output =
            run_command(&argv, temp.path(), Duration::from_millis(50), LIMIT).expect("run");

        assert!(output.timed_out);
        assert!(!output.success);
    }

    /// A child writing far more than the OS pipe buffer must finish promptly
    /// instead of blocking on a full pipe until the timeout kills it.
    #[test]
    fn output_larger_than_pipe_buffer_is_fully_drained() {
        let temp = tempfile::tempdir().expect("tempdir");
        // ~230 KB of stdout, well past the ~64 KB pipe buffer.
        let argv = vec!["seq".to_string(), "1".to_string(), "40000".to_string()];
        let output = run_command(&argv, temp.path(), Duration::from_secs(5), LIMIT).expect("run");

        assert!(output.success, "large output misreported as failure");
        assert!(!output.timed_out, "large output misreported as timeout");
        let text = String::from_utf8_lossy(&output.stdout);
        assert!(text.starts_with("1\n"));
        assert!(text.trim_end().ends_with("40000"));
        assert_eq!(output.stdout_truncated, 0);
    }

    /// The limit bounds memory while the pipe is still drained to EOF.
    #[test]
    fn output_past_the_limit_is_discarded_not_blocking() {
        let temp = tempfile::tempdir().expect("tempdir");
        let argv = vec!["seq".to_string(), "1".to_string(), "40000".to_string()];
        let output = run_command(&argv, temp.path(), Duration::from_secs(5), 1024).expect("run");

        assert!(output.success);
        assert!(!output.timed_out);
        assert!(output.stdout.len() <= 1024);
        assert!(output.stdout_truncated > 0);
    }

    #[test]
    fn render_log_truncates_long_output() {
        let output = CommandOutput {
            success: true,
            timed_out: false,
            stdout: vec![b'a'; 100],
            stderr: Vec::new(),
            stdout_truncated: 0,
            stderr_truncated: 0,
        };
        let log = render_log(&output, 40);
        assert!(log.contains("[truncated"));
        assert!(log.len() < 100);
    }

    #[test]
    fn render_log_notes_discarded_bytes() {
        let output = CommandOutput {
            success: true,
            timed_out: false,
            stdout: vec![b'a'; 10],
            stderr: Vec::new(),
            stdout_truncated: 900,
            stderr_truncated: 0,
        };
        let log = render_log(&output, 10_000);
        assert!(log.contains("[stdout truncated 900 bytes]"));
    }
}
