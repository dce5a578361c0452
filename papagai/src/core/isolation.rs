//! Choosing an isolation strategy.

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Isolation mode requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// Overlay when `fuse-overlayfs` is available, plain worktree otherwise.
    #[default]
    Auto,
    /// A native `git worktree` checkout inside the repository.
    #[value(name = "worktree", alias = "plain")]
    #[serde(rename = "worktree", alias = "plain")]
    Worktree,
    /// A copy-on-write `fuse-overlayfs` mount under the cache directory.
    #[value(name = "overlayfs", alias = "overlay")]
    #[serde(rename = "overlayfs", alias = "overlay")]
    Overlayfs,
}

/// The strategy actually used for a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Plain,
    Overlay,
}

/// Resolve a requested mode against the host's overlay capability.
///
/// An explicit overlay request on a host without support is a configuration
/// error, raised before anything is created.
pub fn select_strategy(requested: Isolation, overlay_supported: bool) -> Result<Strategy> {
    match requested {
        Isolation::Auto if overlay_supported => Ok(Strategy::Overlay),
        Isolation::Auto | Isolation::Worktree => Ok(Strategy::Plain),
        Isolation::Overlayfs if overlay_supported => Ok(Strategy::Overlay),
        Isolation::Overlayfs => Err(Error::OverlayUnsupported),
    }
}
