//! Orchestration for a single "do work" invocation.
//!
//! Resolve the base, prepare the target branch, run the agent inside a fresh
//! workspace, tear the workspace down and fast-forward the target.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::core::isolation::Isolation;
use crate::core::naming::Namespace;
use crate::error::{Error, Result};
use crate::io::agent::{Agent, AgentRequest, allowed_tools};
use crate::io::branches;
use crate::io::instructions::Instructions;
use crate::io::prompt::render_prompt;
use crate::io::reconcile::{MergePath, merge_into_target};
use crate::io::workspace::{TeardownOutcome, TeardownReport, WorkspaceOptions, create_workspace};

/// Parameters for one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub repo_dir: PathBuf,
    /// Ref the work starts from; `HEAD` for the current branch.
    pub base_ref: String,
    /// Branch to fast-forward onto the result, created from the base if missing.
    pub target_branch: Option<String>,
    /// Sub-namespace for the workspace branch, e.g. `review`.
    pub purpose: Option<String>,
    pub isolation: Isolation,
    pub keep: bool,
    pub instructions: Instructions,
    /// Tools allowed beyond the defaults and the instructions' own list.
    pub extra_tools: Vec<String>,
    pub dry_run: bool,
}

impl RunRequest {
    pub fn new(repo_dir: impl Into<PathBuf>, instructions: Instructions) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            base_ref: "HEAD".to_string(),
            target_branch: None,
            purpose: None,
            isolation: Isolation::Auto,
            keep: false,
            instructions,
            extra_tools: Vec::new(),
            dry_run: false,
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Branch the workspace was based on (the target branch when one was given).
    pub base_branch: String,
    pub workspace_branch: String,
    pub teardown: TeardownReport,
    /// How the target was moved; `None` without a target or when merging was skipped.
    pub merge: Option<MergePath>,
}

impl RunOutcome {
    /// Branch the user should look at.
    pub fn deliverable(&self) -> &str {
        if self.merge.is_some() {
            &self.base_branch
        } else {
            &self.workspace_branch
        }
    }

    /// True when teardown left work behind that needs manual attention.
    pub fn needs_attention(&self) -> bool {
        matches!(self.teardown.outcome, TeardownOutcome::Stopped(_))
    }
}

/// Run `agent` on `request` in an isolated workspace.
#[instrument(skip_all, fields(repo = %request.repo_dir.display(), base_ref = %request.base_ref))]
pub fn run_task<A: Agent>(
    agent: &A,
    namespace: &Namespace,
    cache_root: &Path,
    request: &RunRequest,
) -> Result<RunOutcome> {
    let repo_dir = request.repo_dir.as_path();
    let current = branches::resolve(repo_dir, &request.base_ref)?;
    let base_branch = branches::ensure_branch(repo_dir, request.target_branch.as_deref(), &current)?;

    let options = WorkspaceOptions::new(namespace.clone(), cache_root)
        .with_purpose(request.purpose.as_deref())
        .with_keep(request.keep);
    let workspace = create_workspace(repo_dir, &base_branch, &options, request.isolation)?;
    let workspace_branch = workspace.branch().to_string();
    info!(branch = %workspace_branch, base = %base_branch, strategy = ?workspace.strategy(), "working in branch");

    let tools = allowed_tools(request.instructions.tools.iter().chain(&request.extra_tools));
    let (invoked, teardown) = workspace.within(|ws| -> Result<()> {
        let prompt = render_prompt(&request.instructions, &base_branch, ws.branch())
            .map_err(Error::Agent)?;
        agent
            .invoke(&AgentRequest {
                workdir: ws.dir().to_path_buf(),
                instructions: prompt,
                allowed_tools: tools,
                dry_run: request.dry_run,
            })
            .map_err(Error::Agent)
    });
    invoked?;

    let mut outcome = RunOutcome {
        base_branch,
        workspace_branch,
        teardown,
        merge: None,
    };
    if request.target_branch.is_none() {
        return Ok(outcome);
    }
    if !outcome.teardown.branch_complete() {
        warn!(branch = %outcome.workspace_branch, "workspace branch may be incomplete, not merging");
        return Ok(outcome);
    }
    outcome.merge = Some(merge_into_target(
        repo_dir,
        &outcome.base_branch,
        &outcome.workspace_branch,
    )?);
    Ok(outcome)
}
