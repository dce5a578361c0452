//! Error taxonomy for the isolation and reconciliation core.
//!
//! Glue code (config, instruction loading, CLI) stays on `anyhow`; the core
//! returns these typed errors so callers can tell a diverged target apart
//! from a failed mount.

use std::path::PathBuf;

use thiserror::Error;

use crate::io::process::ProcessError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("unable to find ref '{reference}' in {}", repo.display())]
    RefNotFound {
        reference: String,
        repo: PathBuf,
        #[source]
        source: ProcessError,
    },

    #[error("failed to create branch '{branch}': {reason}")]
    BranchCreation { branch: String, reason: String },

    #[error("failed to create workspace for branch '{branch}': {source}")]
    WorkspaceCreation {
        branch: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to mount overlay at {} (is fuse-overlayfs installed?): {reason}", mount_dir.display())]
    OverlayMount { mount_dir: PathBuf, reason: String },

    #[error("fuse-overlayfs is not available; install it or use --isolation=worktree")]
    OverlayUnsupported,

    #[error("cannot fast-forward {dest} to {src}: the branches have diverged, manual merge required")]
    DivergedBranches { dest: String, src: String },

    #[error("failed to merge {src} into {dest}: {reason}; work is available in branch {src}")]
    Merge {
        dest: String,
        src: String,
        reason: String,
    },

    #[error("agent invocation failed: {0:#}")]
    Agent(anyhow::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Branch that still holds the work after a failed reconciliation.
    pub fn recovery_branch(&self) -> Option<&str> {
        match self {
            Error::DivergedBranches { src, .. } | Error::Merge { src, .. } => Some(src),
            _ => None,
        }
    }
}
