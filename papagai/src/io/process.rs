//! Helpers for running child processes.
//!
//! Everything the core does to a repository goes through [`run`]: one
//! blocking call per external command, output captured. The agent gets
//! [`run_relayed`], which echoes stdout lines as they arrive.

use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, anyhow};
use thiserror::Error;
use tracing::{debug, error, instrument, trace, warn};
use wait_timeout::ChildExt;

/// Failure to run an external command, or a non-zero exit when checked.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program} {}` exited with {}: {}", args.join(" "), describe_code(*code), stderr.trim())]
    Failed {
        program: String,
        args: Vec<String>,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

impl ProcessError {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessError::Spawn { .. } => None,
            ProcessError::Failed { code, .. } => *code,
        }
    }

    pub fn stderr(&self) -> &str {
        match self {
            ProcessError::Spawn { .. } => "",
            ProcessError::Failed { stderr, .. } => stderr,
        }
    }
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run `argv` in `cwd` and capture its output.
///
/// With `check`, a non-zero exit becomes [`ProcessError::Failed`] carrying the
/// exit code and both streams. Without it the caller inspects `code` itself.
#[instrument(level = "debug", skip_all, fields(program = argv.first().copied().unwrap_or_default()))]
pub fn run(argv: &[&str], cwd: Option<&Path>, check: bool) -> Result<ProcessOutput, ProcessError> {
    let (program, args) = argv.split_first().ok_or_else(|| ProcessError::Spawn {
        program: String::new(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
    })?;
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    trace!(args = %args.join(" "), cwd = ?cwd, "running command");

    let output = cmd.output().map_err(|source| ProcessError::Spawn {
        program: program.to_string(),
        source,
    })?;
    let result = ProcessOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(exit_code = ?result.code, "command finished");

    if check && !result.success() {
        return Err(ProcessError::Failed {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            code: result.code,
            stdout: result.stdout,
            stderr: result.stderr,
        });
    }
    Ok(result)
}

/// Output of a relayed command.
#[derive(Debug)]
pub struct RelayedOutput {
    pub status: ExitStatus,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

/// Run a command, copying each stdout line to `relay` as soon as it is read.
///
/// Stderr is collected and returned. With a `timeout` the child is killed once
/// it expires; without one this blocks until the child exits.
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = timeout.map(|t| t.as_secs())))]
pub fn run_relayed<W>(
    mut cmd: Command,
    timeout: Option<Duration>,
    relay: W,
) -> anyhow::Result<RelayedOutput>
where
    W: Write + Send + 'static,
{
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {}", display_program(cmd.get_program())));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || relay_lines(stdout, relay));
    let stderr_handle = thread::spawn(move || read_all(stderr));

    let mut timed_out = false;
    let status = match timeout {
        Some(limit) => match child.wait_timeout(limit).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(timeout_secs = limit.as_secs(), "command timed out, killing");
                timed_out = true;
                child.kill().context("kill command")?;
                child.wait().context("wait command after kill")?
            }
        },
        None => child.wait().context("wait for command")?,
    };

    join_reader(stdout_handle).context("join stdout")?;
    let stderr = join_reader(stderr_handle).context("join stderr")?;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(RelayedOutput {
        status,
        stderr,
        timed_out,
    })
}

fn display_program(program: &OsStr) -> String {
    program.to_string_lossy().into_owned()
}

fn join_reader<T>(handle: thread::JoinHandle<anyhow::Result<T>>) -> anyhow::Result<T> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn relay_lines<R: Read, W: Write>(reader: R, mut relay: W) -> anyhow::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).context("read line")?;
        if n == 0 {
            break;
        }
        if let Err(e) = relay.write_all(&line).and_then(|()| relay.flush()) {
            warn!(err = %e, "failed to relay output line");
        }
    }
    Ok(())
}

fn read_all<R: Read>(mut reader: R) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read output")?;
    Ok(buf)
}
