//! The `<tool>/latest` pointer branch.
//!
//! Concurrent runs race on this ref; the last writer wins.

use std::path::Path;

use tracing::{debug, error};

use crate::io::git::Git;

/// Force `latest_branch` to the current tip of `branch`.
///
/// Returns whether the pointer moved. Failures are logged, never raised.
pub fn repoint(repo: &Path, latest_branch: &str, branch: &str) -> bool {
    match Git::new(repo).force_branch(latest_branch, branch) {
        Ok(()) => {
            debug!(latest = latest_branch, branch, "repointed latest branch");
            true
        }
        Err(e) => {
            error!(latest = latest_branch, branch, err = %e, "failed to update latest branch");
            false
        }
    }
}
