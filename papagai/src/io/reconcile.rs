//! Fast-forwarding a target branch onto finished work.
//!
//! History is never rewritten: a target that has diverged from the work
//! branch is left alone and the caller is told where the work lives.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::io::branches;
use crate::io::git::Git;

/// How the target ref was moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePath {
    /// `dest` was checked out: `git merge --ff-only` in the main worktree.
    WorkingTree,
    /// `dest` was not checked out: `git fetch . src:dest`, worktree untouched.
    RefOnly,
}

/// Fast-forward `dest` to `src`.
#[instrument(skip_all, fields(dest, src))]
pub fn merge_into_target(repo: &Path, dest: &str, src: &str) -> Result<MergePath> {
    let git = Git::new(repo);
    let fast_forward = git.is_ancestor(dest, src).map_err(|e| Error::Merge {
        dest: dest.to_string(),
        src: src.to_string(),
        reason: e.to_string(),
    })?;
    if !fast_forward {
        warn!(dest, src, "branches have diverged");
        return Err(Error::DivergedBranches {
            dest: dest.to_string(),
            src: src.to_string(),
        });
    }

    let checked_out = match branches::resolve(repo, "HEAD") {
        Ok(current) => current == dest,
        Err(e) => {
            debug!(err = %e, "could not determine current branch");
            false
        }
    };

    let (path, result) = if checked_out {
        (MergePath::WorkingTree, git.merge_ff_only(src))
    } else {
        (MergePath::RefOnly, git.fetch_refspec(".", src, dest))
    };
    result.map_err(|e| Error::Merge {
        dest: dest.to_string(),
        src: src.to_string(),
        reason: e.to_string(),
    })?;

    info!(dest, src, ?path, "fast-forwarded target branch");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn checked_out_target_uses_working_tree_merge() {
        let repo = TestRepo::new().expect("repo");
        repo.git(&["branch", "work"]).expect("branch");
        repo.git(&["checkout", "--quiet", "work"]).expect("checkout");
        repo.commit_file("a.txt", "a", "work commit").expect("commit");
        repo.git(&["checkout", "--quiet", "main"]).expect("checkout");

        let path = merge_into_target(repo.path(), "main", "work").expect("merge");

        assert_eq!(path, MergePath::WorkingTree);
        assert_eq!(repo.rev("main"), repo.rev("work"));
        assert!(repo.path().join("a.txt").exists());
    }

    #[test]
    fn other_target_moves_ref_only() {
        let repo = TestRepo::new().expect("repo");
        repo.git(&["branch", "feature"]).expect("branch");
        repo.git(&["branch", "work"]).expect("branch");
        repo.git(&["checkout", "--quiet", "work"]).expect("checkout");
        repo.commit_file("a.txt", "a", "work commit").expect("commit");
        repo.git(&["checkout", "--quiet", "main"]).expect("checkout");

        let path = merge_into_target(repo.path(), "feature", "work").expect("merge");

        assert_eq!(path, MergePath::RefOnly);
        assert_eq!(repo.rev("feature"), repo.rev("work"));
        assert!(!repo.path().join("a.txt").exists());
    }

    #[test]
    fn detached_head_uses_ref_only_path() {
        let repo = TestRepo::new().expect("repo");
        repo.git(&["branch", "work"]).expect("branch");
        repo.git(&["checkout", "--quiet", "work"]).expect("checkout");
        repo.commit_file("a.txt", "a", "work commit").expect("commit");
        repo.git(&["checkout", "--quiet", "--detach", "main"])
            .expect("detach");

        let path = merge_into_target(repo.path(), "main", "work").expect("merge");

        assert_eq!(path, MergePath::RefOnly);
        assert_eq!(repo.rev("main"), repo.rev("work"));
    }

    #[test]
    fn diverged_target_is_left_alone() {
        let repo = TestRepo::new().expect("repo");
        repo.git(&["branch", "work"]).expect("branch");
        repo.git(&["checkout", "--quiet", "work"]).expect("checkout");
        repo.commit_file("a.txt", "a", "work commit").expect("commit");
        repo.git(&["checkout", "--quiet", "main"]).expect("checkout");
        repo.commit_file("b.txt", "b", "main commit").expect("commit");
        let before = repo.rev("main");

        let err = merge_into_target(repo.path(), "main", "work").expect_err("diverged");

        assert!(matches!(err, Error::DivergedBranches { .. }));
        assert_eq!(err.recovery_branch(), Some("work"));
        assert_eq!(repo.rev("main"), before);
    }

    #[test]
    fn unknown_source_is_a_merge_error() {
        let repo = TestRepo::new().expect("repo");
        let err = merge_into_target(repo.path(), "main", "missing").expect_err("missing");
        assert!(matches!(err, Error::Merge { .. }));
    }
}
