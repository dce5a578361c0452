//! Test-only helpers: throwaway repositories and a scripted agent.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::agent::{Agent, AgentRequest};
use crate::io::process;

/// A git repository in a temporary directory with one commit on `main`.
///
/// Layout: `<tmp>/test-repo` for the repository and `<tmp>/cache` as a private
/// cache root, so overlay tests never touch the real XDG cache.
pub struct TestRepo {
    _temp: TempDir,
    root: PathBuf,
    cache: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let base = fs::canonicalize(temp.path()).context("canonicalize tempdir")?;
        let root = base.join("test-repo");
        let cache = base.join("cache");
        fs::create_dir_all(&root).context("create repo dir")?;
        fs::create_dir_all(&cache).context("create cache dir")?;

        let repo = Self {
            _temp: temp,
            root,
            cache,
        };
        repo.git(&["init", "--quiet", "-b", "main"])?;
        repo.git(&["config", "user.name", "Test User"])?;
        repo.git(&["config", "user.email", "test@example.com"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.commit_file("README.md", "# Test Repository\n", "Initial commit")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache
    }

    /// Run git in the repository root and return stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        git_in(&self.root, args)
    }

    /// Commit id of `revision`; panics if it does not resolve.
    pub fn rev(&self, revision: &str) -> String {
        self.git(&["rev-parse", "--verify", revision])
            .unwrap_or_else(|e| panic!("rev-parse {revision}: {e:#}"))
            .trim()
            .to_string()
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        self.git(&["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .is_ok()
    }

    /// Write a file and commit it on the current checkout.
    pub fn commit_file(&self, rel: &str, contents: &str, message: &str) -> Result<()> {
        commit_in(&self.root, rel, contents, message)
    }
}

/// Run git in `dir` and return stdout, failing on non-zero exit.
pub fn git_in(dir: &Path, args: &[&str]) -> Result<String> {
    let mut argv = vec!["git"];
    argv.extend_from_slice(args);
    let out = process::run(&argv, Some(dir), true)
        .with_context(|| format!("git {}", args.join(" ")))?;
    Ok(out.stdout)
}

pub fn write_in(dir: &Path, rel: &str, contents: &str) -> Result<()> {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
}

pub fn commit_in(dir: &Path, rel: &str, contents: &str, message: &str) -> Result<()> {
    write_in(dir, rel, contents)?;
    git_in(dir, &["add", rel])?;
    git_in(dir, &["commit", "--quiet", "-m", message])?;
    Ok(())
}

/// What a [`ScriptedAgent`] does inside the workspace.
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    /// Leave the workspace untouched.
    Nothing,
    /// Write and commit a file.
    Commit {
        path: String,
        contents: String,
        message: String,
    },
    /// Write a file and leave it uncommitted.
    Write { path: String, contents: String },
    /// Report a failure without touching anything.
    Fail(String),
}

/// Agent stand-in that performs queued steps instead of spawning a process.
pub struct ScriptedAgent {
    steps: RefCell<Vec<ScriptedStep>>,
    requests: RefCell<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            steps: RefCell::new(steps),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.borrow().clone()
    }
}

impl Agent for ScriptedAgent {
    fn invoke(&self, request: &AgentRequest) -> Result<()> {
        self.requests.borrow_mut().push(request.clone());
        let step = {
            let mut steps = self.steps.borrow_mut();
            if steps.is_empty() {
                return Err(anyhow!("scripted agent has no steps left"));
            }
            steps.remove(0)
        };
        match step {
            ScriptedStep::Nothing => Ok(()),
            ScriptedStep::Commit {
                path,
                contents,
                message,
            } => commit_in(&request.workdir, &path, &contents, &message),
            ScriptedStep::Write { path, contents } => write_in(&request.workdir, &path, &contents),
            ScriptedStep::Fail(reason) => Err(anyhow!(reason)),
        }
    }
}
