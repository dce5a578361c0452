//! Turning caller refs into concrete branch names.

use std::path::Path;

use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::io::git::Git;

/// Branch spec meaning "work on the base branch itself".
pub const CURRENT_BRANCH_SPEC: &str = ".";

/// Resolve `reference` (a branch name or `HEAD`) to a branch name.
#[instrument(skip_all, fields(reference))]
pub fn resolve(repo: &Path, reference: &str) -> Result<String> {
    let git = Git::new(repo);
    let name = git
        .abbrev_ref(reference)
        .map_err(|source| Error::RefNotFound {
            reference: reference.to_string(),
            repo: repo.to_path_buf(),
            source,
        })?;
    debug!(reference, branch = %name, "resolved ref");
    Ok(name)
}

/// Non-failing existence check for a local branch.
pub fn exists(repo: &Path, branch: &str) -> bool {
    Git::new(repo).branch_exists(branch)
}

/// Make sure the branch named by `branch_spec` exists, creating it from `base_branch`.
///
/// `None` or `"."` returns `base_branch` untouched, as does an existing branch.
#[instrument(skip_all, fields(branch_spec, base_branch))]
pub fn ensure_branch(repo: &Path, branch_spec: Option<&str>, base_branch: &str) -> Result<String> {
    let spec = match branch_spec {
        None | Some(CURRENT_BRANCH_SPEC) => return Ok(base_branch.to_string()),
        Some(spec) => spec,
    };
    if exists(repo, spec) {
        debug!(branch = spec, "branch already exists");
        return Ok(spec.to_string());
    }
    debug!(branch = spec, base_branch, "creating new branch");
    Git::new(repo)
        .create_branch(spec, base_branch)
        .map_err(|e| Error::BranchCreation {
            branch: spec.to_string(),
            reason: e.stderr().trim().to_string(),
        })?;
    Ok(spec.to_string())
}
