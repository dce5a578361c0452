//! Git adapter.
//!
//! Workspaces are built and reconciled entirely through git plumbing, so we
//! keep a small, explicit wrapper around `git` subprocess calls. Each method
//! is one external call.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::core::worktree_list::{WorktreeEntry, parse_worktree_list};
use crate::io::process::{self, ProcessError, ProcessOutput};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// `git rev-parse --abbrev-ref --verify <reference>`, trimmed.
    ///
    /// Yields `HEAD` for a detached checkout.
    pub fn abbrev_ref(&self, reference: &str) -> Result<String, ProcessError> {
        let out = self.run_checked(&["rev-parse", "--abbrev-ref", "--verify", reference])?;
        Ok(out.stdout.trim().to_string())
    }

    /// Check whether a revision resolves (`git rev-parse --verify`).
    pub fn verify(&self, revision: &str) -> Result<(), ProcessError> {
        self.run_checked(&["rev-parse", "--verify", "--quiet", revision])?;
        Ok(())
    }

    /// Check whether a local branch exists. Never fails: errors count as absent.
    pub fn branch_exists(&self, branch: &str) -> bool {
        self.run(&["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .is_ok_and(|out| out.success())
    }

    /// Create `branch` at `start_point` without checking it out.
    #[instrument(skip_all, fields(branch, start_point))]
    pub fn create_branch(&self, branch: &str, start_point: &str) -> Result<(), ProcessError> {
        debug!(branch, start_point, "creating branch");
        self.run_checked(&["branch", branch, start_point])?;
        Ok(())
    }

    /// Create or move `branch` to `target` (`git branch -f`).
    pub fn force_branch(&self, branch: &str, target: &str) -> Result<(), ProcessError> {
        self.run_checked(&["branch", "-f", branch, target])?;
        Ok(())
    }

    /// Delete a branch regardless of merge state (`git branch -D`).
    pub fn delete_branch(&self, branch: &str) -> Result<(), ProcessError> {
        self.run_checked(&["branch", "-D", branch])?;
        Ok(())
    }

    /// Short names of local branches matching a glob.
    pub fn list_branches(&self, pattern: &str) -> Result<Vec<String>, ProcessError> {
        let out = self.run_checked(&[
            "branch",
            "--format=%(refname:short)",
            "--list",
            pattern,
        ])?;
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Create and check out `branch` from `start_point`, discarding local state (`checkout -f -b`).
    #[instrument(skip_all, fields(branch, start_point))]
    pub fn force_checkout_new_branch(
        &self,
        branch: &str,
        start_point: &str,
    ) -> Result<(), ProcessError> {
        debug!(branch, start_point, "force checkout of new branch");
        self.run_checked(&["checkout", "-f", "-b", branch, start_point])?;
        Ok(())
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>, ProcessError> {
        let out = self.run_checked(&["status", "--porcelain=v1", "-uall"])?;
        Ok(out
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(parse_status_line)
            .collect())
    }

    /// True when the worktree matches its branch tip (untracked files count as changes).
    pub fn is_clean(&self) -> Result<bool, ProcessError> {
        Ok(self.status_porcelain()?.is_empty())
    }

    /// Untracked, non-ignored files, one path per entry (`ls-files --others -z`).
    pub fn untracked_paths(&self) -> Result<Vec<String>, ProcessError> {
        let out = self.run_checked(&["ls-files", "--others", "--exclude-standard", "-z"])?;
        Ok(out
            .stdout
            .split('\0')
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Location of `name` inside the git directory (`rev-parse --git-path`).
    pub fn git_path(&self, name: &str) -> Result<PathBuf, ProcessError> {
        let out = self.run_checked(&["rev-parse", "--git-path", name])?;
        Ok(self.workdir.join(out.stdout.trim()))
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<(), ProcessError> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Commit staged changes with a message.
    #[instrument(skip_all)]
    pub fn commit(&self, message: &str) -> Result<(), ProcessError> {
        debug!("committing staged changes");
        self.run_checked(&["commit", "--quiet", "-m", message])?;
        Ok(())
    }

    /// `git worktree add --quiet -b <branch> <dir> <start_point>`.
    #[instrument(skip_all, fields(branch, dir = %dir.display()))]
    pub fn worktree_add(
        &self,
        branch: &str,
        dir: &Path,
        start_point: &str,
    ) -> Result<(), ProcessError> {
        let dir = dir.to_string_lossy();
        self.run_checked(&["worktree", "add", "--quiet", "-b", branch, &dir, start_point])?;
        Ok(())
    }

    /// `git worktree remove --force <dir>`.
    pub fn worktree_remove(&self, dir: &Path) -> Result<(), ProcessError> {
        let dir = dir.to_string_lossy();
        self.run_checked(&["worktree", "remove", "--force", &dir])?;
        Ok(())
    }

    pub fn worktree_list(&self) -> Result<Vec<WorktreeEntry>, ProcessError> {
        let out = self.run_checked(&["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&out.stdout))
    }

    /// Fetch `src` from `remote` into local `dest` (`git fetch <remote> <src>:<dest>`).
    ///
    /// With `remote = "."` this moves a local ref without touching the worktree.
    #[instrument(skip_all, fields(remote, src, dest))]
    pub fn fetch_refspec(&self, remote: &str, src: &str, dest: &str) -> Result<(), ProcessError> {
        self.run_checked(&["fetch", "--quiet", remote, &format!("{src}:{dest}")])?;
        Ok(())
    }

    /// True when `ancestor` is reachable from `descendant`.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, ProcessError> {
        let out = self.run(&["merge-base", "--is-ancestor", ancestor, descendant])?;
        match out.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            code => Err(ProcessError::Failed {
                program: "git".to_string(),
                args: ["merge-base", "--is-ancestor", ancestor, descendant]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                code,
                stdout: out.stdout,
                stderr: out.stderr,
            }),
        }
    }

    /// Fast-forward the current checkout to `src` (`git merge --ff-only`).
    pub fn merge_ff_only(&self, src: &str) -> Result<(), ProcessError> {
        self.run_checked(&["merge", "--ff-only", "--quiet", src])?;
        Ok(())
    }

    /// Subject line of the commit `revision` points at.
    pub fn commit_subject(&self, revision: &str) -> Result<String, ProcessError> {
        let out = self.run_checked(&["log", "-1", "--format=%s", revision])?;
        Ok(out.stdout.trim().to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<ProcessOutput, ProcessError> {
        self.invoke(args, true)
    }

    fn run(&self, args: &[&str]) -> Result<ProcessOutput, ProcessError> {
        self.invoke(args, false)
    }

    fn invoke(&self, args: &[&str], check: bool) -> Result<ProcessOutput, ProcessError> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("git");
        argv.extend_from_slice(args);
        process::run(&argv, Some(&self.workdir), check)
    }
}

fn parse_status_line(line: &str) -> Option<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Some(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return None;
    }
    let code = line.get(..2)?.to_string();
    let mut path = line.get(3..)?.trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Some(StatusEntry { code, path })
}
