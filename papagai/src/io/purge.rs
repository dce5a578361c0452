//! Out-of-band cleanup of everything a crashed or interrupted run left behind.
//!
//! Each sweep is independent: a failure in one is recorded and the others
//! still run. Worktrees go first so that branches still checked out in a
//! leftover worktree can be deleted afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use crate::core::naming::Namespace;
use crate::io::git::Git;
use crate::io::workspace::overlay::{self, MOUNT_DIR_NAME, UPPER_DIR_NAME, WORK_DIR_NAME};
use crate::io::workspace::plain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeOptions {
    pub branches: bool,
    pub worktrees: bool,
    pub overlays: bool,
}

impl Default for PurgeOptions {
    fn default() -> Self {
        Self {
            branches: true,
            worktrees: true,
            overlays: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeKind {
    Branches,
    Worktrees,
    Overlays,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeFailure {
    pub kind: PurgeKind,
    /// The branch, path or listing that failed.
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub deleted_branches: Vec<String>,
    pub removed_worktrees: Vec<PathBuf>,
    pub removed_overlays: Vec<PathBuf>,
    /// Overlay directories whose mount could not be released; left untouched.
    pub left_overlays: Vec<PathBuf>,
    pub failures: Vec<PurgeFailure>,
}

impl PurgeReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, kind: PurgeKind, target: impl Into<String>, reason: impl ToString) {
        let failure = PurgeFailure {
            kind,
            target: target.into(),
            reason: reason.to_string(),
        };
        warn!(kind = ?failure.kind, target = %failure.target, reason = %failure.reason, "purge step failed");
        self.failures.push(failure);
    }
}

/// Remove the namespace's worktrees, overlays and branches for `repo_dir`.
#[instrument(skip_all, fields(repo = %repo_dir.display(), ?options))]
pub fn purge(
    repo_dir: &Path,
    namespace: &Namespace,
    cache_root: &Path,
    options: &PurgeOptions,
) -> PurgeReport {
    let mut report = PurgeReport::default();
    if options.worktrees {
        purge_worktrees(repo_dir, namespace, &mut report);
    }
    if options.overlays {
        let overlay_root = overlay::repo_cache_dir(cache_root, namespace.tool(), repo_dir);
        purge_overlays(&overlay_root, &mut report);
    }
    if options.branches {
        purge_branches(repo_dir, namespace, &mut report);
    }
    report
}

fn purge_worktrees(repo_dir: &Path, namespace: &Namespace, report: &mut PurgeReport) {
    let git = Git::new(repo_dir);
    let entries = match git.worktree_list() {
        Ok(entries) => entries,
        Err(e) => return report.fail(PurgeKind::Worktrees, "git worktree list", e),
    };
    for entry in entries {
        let owned = entry
            .branch_ref
            .as_deref()
            .is_some_and(|r| namespace.owns_ref(r));
        if !owned {
            continue;
        }
        info!(path = %entry.path.display(), branch = ?entry.branch_ref, "removing worktree");
        match git.worktree_remove(&entry.path) {
            Ok(()) => {
                plain::prune_empty_ancestors(repo_dir, &entry.path);
                report.removed_worktrees.push(entry.path);
            }
            Err(e) => report.fail(
                PurgeKind::Worktrees,
                entry.path.display().to_string(),
                e,
            ),
        }
    }
}

fn purge_overlays(overlay_root: &Path, report: &mut PurgeReport) {
    if !overlay_root.is_dir() {
        return;
    }
    for mount_dir in find_mount_dirs(overlay_root, report) {
        info!(mount = %mount_dir.display(), "unmounting overlay");
        if let Err(e) = overlay::unmount(&mount_dir) {
            warn!(mount = %mount_dir.display(), err = %e, "failed to unmount, it may not be mounted; leaving it in place");
            report.left_overlays.push(mount_dir);
            continue;
        }
        let Some(base) = mount_dir.parent() else {
            continue;
        };
        info!(dir = %base.display(), "removing overlay directory");
        match fs::remove_dir_all(base) {
            Ok(()) => report.removed_overlays.push(base.to_path_buf()),
            Err(e) => report.fail(PurgeKind::Overlays, base.display().to_string(), e),
        }
    }
}

/// Every `mounted` directory below `root`, at any depth.
///
/// Never descends into mounts or overlay layers, which hold copies of the repository.
fn find_mount_dirs(root: &Path, report: &mut PurgeReport) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !is_layer_dir(entry));
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let target = e
                    .path()
                    .map_or_else(|| root.display().to_string(), |p| p.display().to_string());
                report.fail(PurgeKind::Overlays, target, e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.file_name() == MOUNT_DIR_NAME {
            found.push(entry.into_path());
            walker.skip_current_dir();
        }
    }
    found.sort();
    found
}

fn is_layer_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && (entry.file_name() == UPPER_DIR_NAME || entry.file_name() == WORK_DIR_NAME)
}

fn purge_branches(repo_dir: &Path, namespace: &Namespace, report: &mut PurgeReport) {
    let git = Git::new(repo_dir);
    let branches = match git.list_branches(&namespace.branch_glob()) {
        Ok(branches) => branches,
        Err(e) => return report.fail(PurgeKind::Branches, "git branch --list", e),
    };
    for branch in branches {
        info!(branch = %branch, "deleting branch");
        match git.delete_branch(&branch) {
            Ok(()) => report.deleted_branches.push(branch),
            Err(e) => report.fail(PurgeKind::Branches, branch, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_mounts_at_any_depth_without_descending() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("main-1").join("mounted").join("mounted")).expect("mkdir");
        fs::create_dir_all(root.join("papagai").join("old").join("mounted")).expect("mkdir");
        fs::create_dir_all(root.join("main-2").join("upperdir")).expect("mkdir");
        fs::write(root.join("mounted"), "a file, not a mount").expect("write");

        let mut report = PurgeReport::default();
        let found = find_mount_dirs(root, &mut report);

        assert_eq!(
            found,
            vec![
                root.join("main-1").join("mounted"),
                root.join("papagai").join("old").join("mounted"),
            ]
        );
        assert!(report.is_success());
    }

    #[test]
    fn never_walks_into_overlay_layers() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let base = root.join("main-1");
        fs::create_dir_all(base.join("upperdir").join("docs").join("mounted")).expect("mkdir");
        fs::create_dir_all(base.join("workdir").join("work").join("mounted")).expect("mkdir");
        fs::create_dir_all(base.join("mounted")).expect("mkdir");

        let mut report = PurgeReport::default();
        let found = find_mount_dirs(root, &mut report);

        assert_eq!(found, vec![base.join("mounted")]);
        assert!(report.is_success());
    }

    #[test]
    fn missing_overlay_root_is_a_no_op() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut report = PurgeReport::default();
        purge_overlays(&temp.path().join("nope"), &mut report);
        assert_eq!(report, PurgeReport::default());
    }

    #[test]
    fn unmounted_overlay_dirs_are_left_in_place() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mount = temp.path().join("main-1").join("mounted");
        fs::create_dir_all(&mount).expect("mkdir");

        let mut report = PurgeReport::default();
        purge_overlays(temp.path(), &mut report);

        assert_eq!(report.left_overlays, vec![mount.clone()]);
        assert!(report.removed_overlays.is_empty());
        assert!(mount.exists());
    }
}
