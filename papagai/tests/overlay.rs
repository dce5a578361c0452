//! Overlay workspaces. Skipped unless `fuse-overlayfs` and `/dev/fuse` are available.

use std::path::Path;

use papagai::core::isolation::Strategy;
use papagai::core::naming::Namespace;
use papagai::io::git::Git;
use papagai::io::purge::{PurgeOptions, purge};
use papagai::io::workspace::{
    SAFETY_COMMIT_MESSAGE, TeardownOutcome, Workspace, WorkspaceOptions, overlay,
};
use papagai::test_support::{TestRepo, write_in};

fn overlay_available() -> bool {
    overlay::is_supported() && Path::new("/dev/fuse").exists()
}

fn create(repo: &TestRepo, keep: bool) -> Workspace {
    let options = WorkspaceOptions::new(Namespace::default(), repo.cache_root()).with_keep(keep);
    Workspace::create(repo.path(), "main", &options, Strategy::Overlay).expect("create overlay")
}

#[test]
fn overlay_publishes_branch_and_cleans_up() {
    if !overlay_available() {
        eprintln!("skipping: fuse-overlayfs not available");
        return;
    }
    let repo = TestRepo::new().expect("repo");
    let ws = create(&repo, false);
    let branch = ws.branch().to_string();
    assert_eq!(ws.strategy(), Strategy::Overlay);
    assert!(ws.dir().starts_with(repo.cache_root()));
    let base_dir = ws.dir().parent().expect("overlay base").to_path_buf();
    assert!(!repo.has_branch(&branch));

    let ((), report) = ws.within(|ws| {
        write_in(ws.dir(), "overlay.txt", "from overlay").expect("write");
    });

    assert!(report.safety_commit);
    assert_eq!(report.outcome, TeardownOutcome::Removed);
    assert!(repo.has_branch(&branch));
    assert_eq!(
        Git::new(repo.path()).commit_subject(&branch).expect("subject"),
        SAFETY_COMMIT_MESSAGE
    );
    assert_eq!(repo.rev("papagai/latest"), repo.rev(&branch));
    assert!(!base_dir.exists());
    assert!(!repo.path().join("overlay.txt").exists());
}

#[test]
fn kept_overlay_stays_mounted_until_purged() {
    if !overlay_available() {
        eprintln!("skipping: fuse-overlayfs not available");
        return;
    }
    let repo = TestRepo::new().expect("repo");
    let ws = create(&repo, true);
    let dir = ws.dir().to_path_buf();

    let ((), report) = ws.within(|_| ());

    assert_eq!(report.outcome, TeardownOutcome::Kept);
    assert!(dir.join("README.md").exists());
    assert!(Git::new(&dir).is_clean().expect("status"));

    let purged = purge(
        repo.path(),
        &Namespace::default(),
        repo.cache_root(),
        &PurgeOptions::default(),
    );
    assert!(purged.is_success(), "{:?}", purged.failures);
    assert_eq!(purged.removed_overlays.len(), 1);
    assert!(!dir.exists());
}

#[test]
fn callers_untracked_files_stay_out_of_the_branch() {
    if !overlay_available() {
        eprintln!("skipping: fuse-overlayfs not available");
        return;
    }
    let repo = TestRepo::new().expect("repo");
    write_in(repo.path(), "notes.txt", "scratch").expect("write");
    let exclude = repo.path().join(".git").join("info").join("exclude");
    let before = std::fs::read_to_string(&exclude).ok();
    let ws = create(&repo, false);
    let branch = ws.branch().to_string();

    let ((), report) = ws.within(|ws| {
        assert!(ws.dir().join("notes.txt").exists());
    });

    assert!(!report.safety_commit);
    assert_eq!(report.outcome, TeardownOutcome::Removed);
    assert_eq!(repo.rev(&branch), repo.rev("main"));
    assert!(repo.path().join("notes.txt").exists());
    assert_eq!(std::fs::read_to_string(&exclude).ok(), before);
}
