//! Agent abstraction for running instructions inside a workspace.
//!
//! The [`Agent`] trait decouples orchestration from the external coding agent
//! (currently the `claude` CLI). Tests use a scripted agent that edits the
//! workspace directly instead of spawning a process.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::io::config::AgentConfig;
use crate::io::process::run_relayed;

/// Tools every run may use: read the tree, edit files, inspect and commit history.
pub const DEFAULT_ALLOWED_TOOLS: &[&str] = &[
    "Glob",
    "Grep",
    "Read",
    "Bash(git status)",
    "Bash(git diff:*)",
    "Bash(git log:*)",
    "Bash(git show:*)",
    "Bash(git add:*)",
    "Bash(git commit:*)",
    "Edit(./**)",
    "Write(./**)",
];

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Workspace directory the agent runs in.
    pub workdir: PathBuf,
    /// Fully rendered instruction text.
    pub instructions: String,
    pub allowed_tools: Vec<String>,
    /// Print the command instead of running it.
    pub dry_run: bool,
}

/// Abstraction over agent backends.
pub trait Agent {
    /// Run the agent in `request.workdir`. Returning means the agent has exited.
    fn invoke(&self, request: &AgentRequest) -> Result<()>;
}

/// Agent that spawns the `claude` CLI.
#[derive(Debug, Clone)]
pub struct ClaudeAgent {
    command: Vec<String>,
    timeout: Option<Duration>,
}

impl ClaudeAgent {
    pub fn new(command: Vec<String>, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.command.clone(), config.timeout())
    }

    /// Full argv: the configured command followed by the tool list and prompt.
    pub fn argv(&self, request: &AgentRequest) -> Vec<String> {
        let mut argv = self.command.clone();
        argv.push("--allowed-tools".to_string());
        argv.push(request.allowed_tools.join(" "));
        argv.push("-p".to_string());
        argv.push(request.instructions.clone());
        argv
    }

    /// What a dry run prints.
    pub fn dry_run_text(&self, request: &AgentRequest) -> String {
        let dir = request.workdir.to_string_lossy();
        format!(
            "Would execute command:\n  cd {}\n  {}\n",
            shell_words::quote(&dir),
            shell_words::join(self.argv(request))
        )
    }
}

impl Agent for ClaudeAgent {
    #[instrument(skip_all, fields(workdir = %request.workdir.display(), dry_run = request.dry_run))]
    fn invoke(&self, request: &AgentRequest) -> Result<()> {
        if request.dry_run {
            print!("{}", self.dry_run_text(request));
            io::stdout().flush()?;
            return Ok(());
        }

        if self.command.is_empty() {
            bail!("agent command is empty");
        }
        let argv = self.argv(request);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("agent command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&request.workdir);

        info!("agent is pondering, contemplating, mulling, puzzling, meditating, etc.");
        let output = run_relayed(cmd, self.timeout, io::stdout())?;

        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            eprint!("{stderr}");
        }
        if output.timed_out {
            warn!(timeout_secs = ?self.timeout.map(|t| t.as_secs()), "agent timed out");
            bail!("{program} timed out after {:?}", self.timeout.unwrap_or_default());
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            bail!("{program} exited with status {:?}", output.status.code());
        }
        debug!("agent finished");
        Ok(())
    }
}

/// Default tools plus `extra`, deduplicated in order.
pub fn allowed_tools<'a>(extra: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut tools: Vec<String> = DEFAULT_ALLOWED_TOOLS.iter().map(|t| t.to_string()).collect();
    for tool in extra {
        if !tools.contains(tool) {
            tools.push(tool.clone());
        }
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dir: &std::path::Path) -> AgentRequest {
        AgentRequest {
            workdir: dir.to_path_buf(),
            instructions: "fix the bug".to_string(),
            allowed_tools: vec!["Read".to_string(), "Bash(git log:*)".to_string()],
            dry_run: false,
        }
    }

    fn sh(script: &str) -> Vec<String> {
        ["sh", "-c", script, "sh"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn argv_appends_tools_and_prompt() {
        let agent = ClaudeAgent::new(vec!["claude".to_string()], None);
        let argv = agent.argv(&request(std::path::Path::new("/w")));
        assert_eq!(
            argv,
            vec!["claude", "--allowed-tools", "Read Bash(git log:*)", "-p", "fix the bug"]
        );
    }

    #[test]
    fn dry_run_text_quotes_arguments() {
        let agent = ClaudeAgent::new(vec!["claude".to_string()], None);
        let text = agent.dry_run_text(&request(std::path::Path::new("/my repo/w")));
        assert!(text.starts_with("Would execute command:\n"));
        assert!(text.contains("cd '/my repo/w'"));
        assert!(text.contains("-p 'fix the bug'"));
    }

    #[test]
    fn dry_run_does_not_spawn() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = ClaudeAgent::new(vec!["definitely-not-a-real-agent".to_string()], None);
        let mut req = request(temp.path());
        req.dry_run = true;
        agent.invoke(&req).expect("dry run");
    }

    #[test]
    fn runs_in_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = ClaudeAgent::new(sh("pwd > where.txt"), None);
        agent.invoke(&request(temp.path())).expect("invoke");
        let recorded = std::fs::read_to_string(temp.path().join("where.txt")).expect("read");
        let expected = std::fs::canonicalize(temp.path()).expect("canonicalize");
        assert_eq!(std::path::Path::new(recorded.trim()), expected);
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = ClaudeAgent::new(sh("exit 3"), None);
        let err = agent.invoke(&request(temp.path())).expect_err("fails");
        assert!(err.to_string().contains("Some(3)"));
    }

    #[test]
    fn timeout_kills_agent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = ClaudeAgent::new(sh("exec sleep 5"), Some(Duration::from_millis(100)));
        let err = agent.invoke(&request(temp.path())).expect_err("times out");
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn empty_command_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = ClaudeAgent::new(Vec::new(), None);
        let err = agent.invoke(&request(temp.path())).expect_err("empty");
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn allowed_tools_extends_defaults_without_duplicates() {
        let extra = vec!["Read".to_string(), "Bash(cargo test:*)".to_string()];
        let tools = allowed_tools(&extra);
        assert_eq!(tools.len(), DEFAULT_ALLOWED_TOOLS.len() + 1);
        assert_eq!(tools.last().map(String::as_str), Some("Bash(cargo test:*)"));
    }
}
