//! Plain strategy: a native `git worktree` inside the repository.
//!
//! The workspace lives at `<repo>/<branch>`, so a branch like
//! `papagai/main-20260101-1200-1a2b3c4d` becomes nested directories that are
//! pruned again on cleanup.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;
use crate::io::git::Git;

pub fn workspace_dir(repo_dir: &Path, branch: &str) -> PathBuf {
    repo_dir.join(branch)
}

/// Register a worktree for a fresh `branch` off `base_branch` at `dir`.
///
/// On failure anything partially created (directory, branch) is rolled back.
pub fn provision(repo_dir: &Path, branch: &str, dir: &Path, base_branch: &str) -> Result<()> {
    let git = Git::new(repo_dir);
    if let Err(e) = git.worktree_add(branch, dir, base_branch) {
        warn!(branch, dir = %dir.display(), err = %e, "git worktree add failed, rolling back");
        if dir.exists()
            && let Err(rm) = fs::remove_dir_all(dir)
        {
            warn!(dir = %dir.display(), err = %rm, "failed to remove partial worktree directory");
        }
        prune_empty_ancestors(repo_dir, dir);
        // The name was unused before we started, so anything under it is ours.
        if git.branch_exists(branch)
            && let Err(del) = git.delete_branch(branch)
        {
            warn!(branch, err = %del, "failed to delete partially created branch");
        }
        return Err(e.into());
    }
    debug!(branch, dir = %dir.display(), "worktree created");
    Ok(())
}

/// Deregister the worktree and delete its directory plus now-empty parents.
///
/// Best effort: returns shell commands for anything left behind.
pub fn cleanup(repo_dir: &Path, dir: &Path) -> Vec<String> {
    let mut leftovers = Vec::new();
    if let Err(e) = Git::new(repo_dir).worktree_remove(dir) {
        debug!(dir = %dir.display(), err = %e, "git worktree remove failed");
    }
    if dir.exists()
        && let Err(e) = fs::remove_dir_all(dir)
    {
        warn!(dir = %dir.display(), err = %e, "failed to remove worktree directory");
        leftovers.push(format!("rm -rf {}", dir.display()));
    }
    prune_empty_ancestors(repo_dir, dir);
    leftovers
}

/// Remove empty directories above `dir`, stopping at `root` or the first non-empty one.
pub fn prune_empty_ancestors(root: &Path, dir: &Path) {
    let mut current = dir.parent();
    while let Some(candidate) = current {
        if candidate == root || !candidate.starts_with(root) {
            break;
        }
        let empty = fs::read_dir(candidate)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !empty || fs::remove_dir(candidate).is_err() {
            break;
        }
        current = candidate.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_dir_nests_branch_components() {
        let dir = workspace_dir(Path::new("/repo"), "papagai/review/main-1");
        assert_eq!(dir, PathBuf::from("/repo/papagai/review/main-1"));
    }

    #[test]
    fn prunes_only_empty_ancestors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let leaf = root.join("papagai").join("review").join("main-1");
        fs::create_dir_all(&leaf).expect("mkdir");
        fs::write(root.join("papagai").join("keep.txt"), "x").expect("write");
        fs::remove_dir(&leaf).expect("rmdir leaf");

        prune_empty_ancestors(root, &leaf);

        assert!(!root.join("papagai").join("review").exists());
        assert!(root.join("papagai").exists());
        assert!(root.exists());
    }

    #[test]
    fn never_prunes_the_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("repo");
        let leaf = root.join("a");
        fs::create_dir_all(&leaf).expect("mkdir");
        fs::remove_dir(&leaf).expect("rmdir");

        prune_empty_ancestors(&root, &leaf);

        assert!(root.exists());
    }
}
