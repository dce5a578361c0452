//! Ephemeral, branch-bound copies of a repository.
//!
//! A [`Workspace`] is created on a fresh branch, handed to the caller, and
//! torn down exactly once: explicitly through [`Workspace::within`] or
//! [`Workspace::teardown`], or on drop (including unwinding). Teardown runs
//! the same skeleton for both strategies:
//!
//! 1. commit anything left uncommitted (the safety net),
//! 2. overlay only: publish the branch into the main repository,
//! 3. repoint the latest-run branch,
//! 4. remove the physical copy unless `keep` was requested.
//!
//! Steps 1 and 2 stop teardown on failure so nothing the agent produced is
//! ever thrown away. Teardown itself never fails; problems are logged and
//! reported back with the shell commands needed to finish by hand.

pub mod overlay;
pub mod plain;

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, instrument, warn};

use crate::core::isolation::{Isolation, Strategy, select_strategy};
use crate::core::naming::{Namespace, fresh_stem, prefixed_branch};
use crate::error::{Error, Result};
use crate::io::git::Git;
use crate::io::latest;

pub use overlay::OverlayLayout;

/// Commit message for changes the agent left behind.
pub const SAFETY_COMMIT_MESSAGE: &str = "FIXME: changes left in worktree";

/// Settings fixed at workspace construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceOptions {
    pub namespace: Namespace,
    /// Prefix of the workspace branch, e.g. `papagai/` or `papagai/review/`.
    pub branch_prefix: String,
    /// Skip physical cleanup on teardown.
    pub keep: bool,
    /// Root under which overlay layers are created.
    pub cache_root: PathBuf,
}

impl WorkspaceOptions {
    pub fn new(namespace: Namespace, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            branch_prefix: namespace.prefix(),
            namespace,
            keep: false,
            cache_root: cache_root.into(),
        }
    }

    pub fn with_purpose(mut self, purpose: Option<&str>) -> Self {
        self.branch_prefix = self.namespace.branch_prefix(purpose);
        self
    }

    pub fn with_keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }
}

/// Physical layer backing a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Plain,
    Overlay(OverlayLayout),
}

/// Where teardown stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStage {
    /// The uncommitted-change check itself failed.
    StatusCheck,
    SafetyCommit,
    Publish,
    Unmount,
    /// A panic inside teardown.
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// The physical copy is gone.
    Removed,
    /// `keep` was set; the copy is still usable.
    Kept,
    /// Teardown stopped; everything from this stage on was left in place.
    Stopped(TeardownStage),
    /// Teardown had already run.
    AlreadyTornDown,
}

/// What teardown did, plus commands to finish by hand when it could not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub safety_commit: bool,
    pub latest_updated: bool,
    pub outcome: TeardownOutcome,
    pub recovery: Vec<String>,
}

impl TeardownReport {
    fn new() -> Self {
        Self {
            safety_commit: false,
            latest_updated: false,
            outcome: TeardownOutcome::Removed,
            recovery: Vec::new(),
        }
    }

    /// True once the branch holds all the work and lives in the main repository.
    ///
    /// A failed unmount only leaves the physical copy behind.
    pub fn branch_complete(&self) -> bool {
        matches!(
            self.outcome,
            TeardownOutcome::Removed
                | TeardownOutcome::Kept
                | TeardownOutcome::Stopped(TeardownStage::Unmount)
        )
    }

    fn stop(&mut self, stage: TeardownStage, recovery: Vec<String>) {
        self.outcome = TeardownOutcome::Stopped(stage);
        self.recovery = recovery;
    }
}

/// One isolated checkout on a fresh branch.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    branch: String,
    repo_dir: PathBuf,
    keep: bool,
    latest_branch: String,
    layer: Layer,
    torn_down: bool,
}

/// Pick a strategy for `isolation` and create the workspace.
///
/// Configuration errors (overlay requested but unavailable) surface before
/// anything is created.
pub fn create_workspace(
    repo_dir: &Path,
    base_branch: &str,
    options: &WorkspaceOptions,
    isolation: Isolation,
) -> Result<Workspace> {
    let strategy = select_strategy(isolation, overlay::is_supported())?;
    debug!(?isolation, ?strategy, "selected isolation strategy");
    Workspace::create(repo_dir, base_branch, options, strategy)
}

impl Workspace {
    /// Provision a workspace on `{prefix}{base}-{timestamp}-{suffix}` off `base_branch`.
    #[instrument(skip_all, fields(base_branch, strategy = ?strategy))]
    pub fn create(
        repo_dir: &Path,
        base_branch: &str,
        options: &WorkspaceOptions,
        strategy: Strategy,
    ) -> Result<Self> {
        let git = Git::new(repo_dir);
        let overlay_root =
            overlay::repo_cache_dir(&options.cache_root, options.namespace.tool(), repo_dir);

        let stem = fresh_stem(base_branch, |stem| {
            let branch = prefixed_branch(&options.branch_prefix, stem);
            let dir_taken = match strategy {
                Strategy::Plain => plain::workspace_dir(repo_dir, &branch).exists(),
                Strategy::Overlay => overlay_root.join(stem).exists(),
            };
            dir_taken || git.branch_exists(&branch)
        })
        .ok_or_else(|| Error::WorkspaceCreation {
            branch: format!("{}{base_branch}", options.branch_prefix),
            source: Box::new(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "no unused workspace name found",
            ))),
        })?;
        let branch = prefixed_branch(&options.branch_prefix, &stem);

        let (dir, layer) = match strategy {
            Strategy::Plain => {
                let dir = plain::workspace_dir(repo_dir, &branch);
                plain::provision(repo_dir, &branch, &dir, base_branch)
                    .map(|()| (dir, Layer::Plain))
            }
            Strategy::Overlay => {
                let layout = OverlayLayout::new(&overlay_root, &stem);
                overlay::provision(repo_dir, &layout, &branch, base_branch)
                    .map(|()| (layout.mount_dir.clone(), Layer::Overlay(layout)))
            }
        }
        .map_err(|e| Error::WorkspaceCreation {
            branch: branch.clone(),
            source: Box::new(e),
        })?;

        info!(branch = %branch, dir = %dir.display(), "workspace created");
        Ok(Self {
            dir,
            branch,
            repo_dir: repo_dir.to_path_buf(),
            keep: options.keep,
            latest_branch: options.namespace.latest_branch(),
            layer,
            torn_down: false,
        })
    }

    /// Directory the agent works in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn strategy(&self) -> Strategy {
        match self.layer {
            Layer::Plain => Strategy::Plain,
            Layer::Overlay(_) => Strategy::Overlay,
        }
    }

    /// Run `work` against the workspace, then tear it down.
    ///
    /// Teardown happens whatever `work` returns; if `work` panics it happens
    /// while unwinding through [`Drop`].
    pub fn within<T>(mut self, work: impl FnOnce(&Workspace) -> T) -> (T, TeardownReport) {
        let value = work(&self);
        let report = self.teardown();
        (value, report)
    }

    /// Run the teardown sequence. Only the first call does anything.
    pub fn teardown(&mut self) -> TeardownReport {
        if self.torn_down {
            return TeardownReport {
                outcome: TeardownOutcome::AlreadyTornDown,
                ..TeardownReport::new()
            };
        }
        self.torn_down = true;

        let this = &*self;
        match panic::catch_unwind(AssertUnwindSafe(|| this.run_teardown())) {
            Ok(report) => report,
            Err(_) => {
                warn!(branch = %self.branch, "unexpected failure during workspace teardown");
                let mut report = TeardownReport::new();
                report.stop(TeardownStage::Internal, self.leave_in_place_commands());
                log_recovery(&report.recovery);
                report
            }
        }
    }

    fn run_teardown(&self) -> TeardownReport {
        let mut report = TeardownReport::new();
        let git = Git::new(&self.dir);

        match git.is_clean() {
            Ok(true) => debug!(branch = %self.branch, "workspace is clean"),
            Ok(false) => {
                warn!(branch = %self.branch, "uncommitted changes found in workspace, committing them");
                if let Err(e) = git.add_all().and_then(|()| git.commit(SAFETY_COMMIT_MESSAGE)) {
                    error!(branch = %self.branch, err = %e, "failed to commit uncommitted changes");
                    report.stop(TeardownStage::SafetyCommit, self.leave_in_place_commands());
                    log_recovery(&report.recovery);
                    return report;
                }
                report.safety_commit = true;
            }
            Err(e) => {
                error!(branch = %self.branch, err = %e, "failed to check workspace status");
                report.stop(TeardownStage::StatusCheck, self.leave_in_place_commands());
                log_recovery(&report.recovery);
                return report;
            }
        }

        if let Layer::Overlay(layout) = &self.layer
            && let Err(e) = overlay::publish(&self.repo_dir, layout, &self.branch)
        {
            error!(branch = %self.branch, err = %e, "failed to pull branch from overlay");
            report.stop(TeardownStage::Publish, self.overlay_commands(layout, true));
            log_recovery(&report.recovery);
            return report;
        }

        report.latest_updated = latest::repoint(&self.repo_dir, &self.latest_branch, &self.branch);

        if self.keep {
            info!(branch = %self.branch, dir = %self.dir.display(), "keeping workspace");
            report.outcome = TeardownOutcome::Kept;
            return report;
        }

        match &self.layer {
            Layer::Plain => {
                report.recovery = plain::cleanup(&self.repo_dir, &self.dir);
                if !report.recovery.is_empty() {
                    log_recovery(&report.recovery);
                }
            }
            Layer::Overlay(layout) => {
                if let Err(e) = overlay::cleanup(layout) {
                    error!(mount = %layout.mount_dir.display(), err = %e, "failed to unmount overlay");
                    report.stop(TeardownStage::Unmount, self.overlay_commands(layout, false));
                    log_recovery(&report.recovery);
                    return report;
                }
            }
        }
        debug!(branch = %self.branch, "workspace removed");
        report
    }

    /// Commands that save any pending work and then release the workspace.
    fn leave_in_place_commands(&self) -> Vec<String> {
        let dir = self.dir.display();
        let mut commands = vec![
            format!("git -C {dir} add -A"),
            format!("git -C {dir} commit -m \"{SAFETY_COMMIT_MESSAGE}\""),
        ];
        match &self.layer {
            Layer::Plain => commands.push(format!(
                "git -C {} worktree remove --force {dir}",
                self.repo_dir.display()
            )),
            Layer::Overlay(layout) => commands.extend(self.overlay_commands(layout, true)),
        }
        commands
    }

    fn overlay_commands(&self, layout: &OverlayLayout, with_fetch: bool) -> Vec<String> {
        let mut commands = Vec::new();
        if with_fetch {
            commands.push(format!(
                "git -C {} fetch {} {branch}:{branch}",
                self.repo_dir.display(),
                layout.mount_dir.display(),
                branch = self.branch
            ));
        }
        commands.push(format!(
            "{} -u {}",
            overlay::unmount_helper(),
            layout.mount_dir.display()
        ));
        commands.push(format!("rm -rf {}", layout.base_dir.display()));
        commands
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.torn_down {
            self.teardown();
        }
    }
}

fn log_recovery(commands: &[String]) {
    error!("to clean up manually, run:");
    for command in commands {
        error!("  $ {command}");
    }
}
