//! Overlay strategy: a `fuse-overlayfs` mount with the repository as the
//! read-only lower layer.
//!
//! Layout: `<cache>/<tool>/<repo-name>/<stem>/{upperdir,workdir,mounted}`.
//! The stem carries no tool prefix so the cache tree stays flat.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::io::git::Git;
use crate::io::process::{self, ProcessError};

pub const OVERLAY_HELPER: &str = "fuse-overlayfs";
pub const MOUNT_DIR_NAME: &str = "mounted";
pub const UPPER_DIR_NAME: &str = "upperdir";
pub const WORK_DIR_NAME: &str = "workdir";

/// True iff the overlay mount helper is on `PATH`.
pub fn is_supported() -> bool {
    which::which(OVERLAY_HELPER).is_ok()
}

/// The per-user cache root (`$XDG_CACHE_HOME`, else the platform default).
pub fn default_cache_root() -> Option<PathBuf> {
    dirs::cache_dir()
}

/// `<cache>/<tool>/<repo-name>`: everything overlay-related for one repository.
pub fn repo_cache_dir(cache_root: &Path, tool: &str, repo_dir: &Path) -> PathBuf {
    let repo_name = repo_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repo".to_string());
    cache_root.join(tool).join(repo_name)
}

/// Directories backing one overlay workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayLayout {
    pub base_dir: PathBuf,
    pub upper_dir: PathBuf,
    pub work_dir: PathBuf,
    pub mount_dir: PathBuf,
}

impl OverlayLayout {
    pub fn new(repo_cache_dir: &Path, stem: &str) -> Self {
        let base_dir = repo_cache_dir.join(stem);
        Self {
            upper_dir: base_dir.join(UPPER_DIR_NAME),
            work_dir: base_dir.join(WORK_DIR_NAME),
            mount_dir: base_dir.join(MOUNT_DIR_NAME),
            base_dir,
        }
    }

    fn lower_upper_work(&self, repo_dir: &Path) -> String {
        format!(
            "lowerdir={},upperdir={},workdir={}",
            repo_dir.display(),
            self.upper_dir.display(),
            self.work_dir.display()
        )
    }
}

/// Scaffold, mount and check out `branch` inside the overlay.
///
/// Each step undoes the previous ones on failure.
pub fn provision(
    repo_dir: &Path,
    layout: &OverlayLayout,
    branch: &str,
    base_branch: &str,
) -> Result<()> {
    debug!(base = %layout.base_dir.display(), "setting up overlay");
    for dir in [&layout.upper_dir, &layout.work_dir, &layout.mount_dir] {
        if let Err(e) = fs::create_dir_all(dir) {
            remove_base_dir(layout);
            return Err(e.into());
        }
    }

    if let Err(e) = mount(repo_dir, layout) {
        remove_base_dir(layout);
        return Err(Error::OverlayMount {
            mount_dir: layout.mount_dir.clone(),
            reason: e.to_string(),
        });
    }

    if let Err(e) = Git::new(&layout.mount_dir).force_checkout_new_branch(branch, base_branch) {
        abandon_mount(layout);
        return Err(Error::BranchCreation {
            branch: branch.to_string(),
            reason: e.stderr().trim().to_string(),
        });
    }

    if let Err(e) = exclude_inherited_untracked(&layout.mount_dir) {
        abandon_mount(layout);
        return Err(e);
    }
    debug!(branch, mount = %layout.mount_dir.display(), "overlay workspace ready");
    Ok(())
}

fn abandon_mount(layout: &OverlayLayout) {
    if let Err(um) = unmount(&layout.mount_dir) {
        warn!(mount = %layout.mount_dir.display(), err = %um, "unmount after failed setup failed");
    }
    remove_base_dir(layout);
}

/// Hide untracked files the mount inherited from the caller's working tree.
///
/// The repository is the lower layer, so its untracked files show through
/// and would otherwise end up in the safety-net commit. They are listed in
/// the mount's own `info/exclude`, which is written to the upper layer.
/// Returns how many paths were excluded.
pub fn exclude_inherited_untracked(dir: &Path) -> Result<usize> {
    let git = Git::new(dir);
    let inherited = git.untracked_paths()?;
    if inherited.is_empty() {
        return Ok(0);
    }
    let exclude = git.git_path("info/exclude")?;
    if !exclude.starts_with(dir) {
        // A linked checkout shares its exclude file with the main repository.
        warn!(exclude = %exclude.display(), "exclude file is outside the workspace, leaving it alone");
        return Ok(0);
    }
    if let Some(parent) = exclude.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut block = String::from("\n# untracked in the main working tree\n");
    let mut count = 0;
    for path in &inherited {
        let Some(pattern) = exclude_pattern(path) else {
            warn!(path, "cannot express path as an exclude pattern, skipping");
            continue;
        };
        block.push_str(&pattern);
        block.push('\n');
        count += 1;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&exclude)?
        .write_all(block.as_bytes())?;
    debug!(count, exclude = %exclude.display(), "excluded inherited untracked files");
    Ok(count)
}

/// Anchored gitignore pattern matching exactly `path`, with glob characters escaped.
fn exclude_pattern(path: &str) -> Option<String> {
    if path.contains('\n') {
        return None;
    }
    let mut pattern = String::with_capacity(path.len() + 1);
    pattern.push('/');
    for c in path.chars() {
        if matches!(c, '\\' | '*' | '?' | '[') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    let trimmed = pattern.trim_end_matches(' ').len();
    let trailing = pattern.len() - trimmed;
    pattern.truncate(trimmed);
    for _ in 0..trailing {
        pattern.push_str("\\ ");
    }
    Some(pattern)
}

pub fn mount(repo_dir: &Path, layout: &OverlayLayout) -> Result<(), ProcessError> {
    let options = layout.lower_upper_work(repo_dir);
    let target = layout.mount_dir.to_string_lossy();
    process::run(&[OVERLAY_HELPER, "-o", &options, &target], None, true)?;
    Ok(())
}

pub fn unmount(mount_dir: &Path) -> Result<(), ProcessError> {
    let target = mount_dir.to_string_lossy();
    process::run(&[unmount_helper(), "-u", &target], None, true)?;
    Ok(())
}

/// `fusermount`, or `fusermount3` on hosts that only ship FUSE 3.
pub fn unmount_helper() -> &'static str {
    if which::which("fusermount").is_err() && which::which("fusermount3").is_ok() {
        "fusermount3"
    } else {
        "fusermount"
    }
}

/// Copy the workspace branch out of the mount into the main repository and check it landed.
pub fn publish(repo_dir: &Path, layout: &OverlayLayout, branch: &str) -> Result<(), ProcessError> {
    let git = Git::new(repo_dir);
    git.fetch_refspec(&layout.mount_dir.to_string_lossy(), branch, branch)?;
    git.verify(branch)?;
    debug!(branch, "branch published from overlay");
    Ok(())
}

/// Unmount, then delete the cache-side directories.
///
/// The backing directories are kept when unmounting fails.
pub fn cleanup(layout: &OverlayLayout) -> Result<(), ProcessError> {
    if layout.mount_dir.exists() {
        unmount(&layout.mount_dir)?;
    }
    remove_base_dir(layout);
    Ok(())
}

fn remove_base_dir(layout: &OverlayLayout) {
    if layout.base_dir.exists()
        && let Err(e) = fs::remove_dir_all(&layout.base_dir)
    {
        warn!(dir = %layout.base_dir.display(), err = %e, "failed to remove overlay directory");
    }
}
