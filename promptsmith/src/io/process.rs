//! Child-process plumbing for command-backed generators.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes discarded past the output limit, stdout and stderr combined.
    pub truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Last line of stderr, for error messages.
    pub fn stderr_tail(&self) -> String {
        String::from_utf8_lossy(&self.stderr)
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

/// Run `cmd` feeding `stdin`, killing it after `timeout`.
///
/// Stdin is written and stdout/stderr are drained on separate threads so a
/// chatty child cannot deadlock against a full pipe. At most
/// `output_limit_bytes` of each stream are kept.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: &[u8],
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;
    debug!(pid = child.id(), "spawned child process");

    let mut child_stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let input = stdin.to_vec();
    let stdin_handle = thread::spawn(move || -> Result<()> {
        child_stdin.write_all(&input).context("write stdin")?;
        Ok(())
    });
    let stdout_handle = thread::spawn(move || read_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_limited(stderr, output_limit_bytes));

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            child.kill().context("kill command")?;
            (child.wait().context("wait command after kill")?, true)
        }
    };

    if let Err(err) = join(stdin_handle) {
        // A child that exits before reading all input closes the pipe early.
        debug!(err = %err, "stdin writer finished with error");
    }
    let (stdout, stdout_dropped) = join(stdout_handle).context("join stdout")?;
    let (stderr, stderr_dropped) = join(stderr_handle).context("join stderr")?;
    let truncated = stdout_dropped + stderr_dropped;
    if truncated > 0 {
        warn!(truncated, "command output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        truncated,
        timed_out,
    })
}

fn join<T>(handle: thread::JoinHandle<Result<T>>) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow!("process I/O thread panicked"))?
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len()).min(n);
        kept.extend_from_slice(&chunk[..room]);
        dropped += n - room;
    }
    Ok((kept, dropped))
}
