//! CLI tests: spawn the papagai binary against throwaway repositories.
//!
//! `XDG_CONFIG_HOME` and `XDG_CACHE_HOME` point into the test's temp space so
//! user configuration and caches never leak in.

use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};

use papagai::exit_codes;
use papagai::test_support::TestRepo;

fn papagai(repo: &TestRepo, args: &[&str], stdin: Option<&str>) -> Output {
    let xdg = repo.cache_root().join("xdg");
    let mut child = Command::new(env!("CARGO_BIN_EXE_papagai"))
        .current_dir(repo.path())
        .env("XDG_CONFIG_HOME", xdg.join("config"))
        .env("XDG_CACHE_HOME", xdg.join("cache"))
        .env_remove("RUST_LOG")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn papagai");
    {
        let mut pipe = child.stdin.take().expect("stdin");
        if let Some(input) = stdin {
            pipe.write_all(input.as_bytes()).expect("write stdin");
        }
    }
    child.wait_with_output().expect("wait papagai")
}

fn write_user_config(repo: &TestRepo, contents: &str) {
    let dir = repo.cache_root().join("xdg").join("config").join("papagai");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("config.toml"), contents).expect("write config");
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn task_list_shows_builtin_tasks() {
    let repo = TestRepo::new().expect("repo");
    let out = papagai(&repo, &["task", "--list"], None);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{}", stderr(&out));
    let listing = stdout(&out);
    assert!(listing.contains("typos"));
    assert!(listing.contains(" ... "));
}

#[test]
fn task_list_includes_user_tasks() {
    let repo = TestRepo::new().expect("repo");
    let tasks = repo.cache_root().join("xdg").join("config").join("papagai").join("tasks");
    fs::create_dir_all(tasks.join("mine")).expect("mkdir");
    fs::write(tasks.join("mine").join("lint.md"), "---\ndescription: run the linter\n---\nlint").expect("write");

    let out = papagai(&repo, &["task", "--list"], None);

    assert_eq!(out.status.code(), Some(exit_codes::OK), "{}", stderr(&out));
    assert!(stdout(&out).contains("mine/lint ... run the linter"));
}

#[test]
fn task_without_name_lists_and_fails() {
    let repo = TestRepo::new().expect("repo");
    let out = papagai(&repo, &["task"], None);
    assert_eq!(out.status.code(), Some(exit_codes::FAILED));
    assert!(stderr(&out).contains("missing task name"));
    assert!(stdout(&out).contains("typos"));
}

#[test]
fn unknown_task_fails() {
    let repo = TestRepo::new().expect("repo");
    let out = papagai(&repo, &["task", "no-such-task"], None);
    assert_eq!(out.status.code(), Some(exit_codes::FAILED));
    assert!(stderr(&out).contains("not found"));
}

#[test]
fn empty_instructions_are_rejected() {
    let repo = TestRepo::new().expect("repo");
    let out = papagai(&repo, &["do"], Some("   \n"));
    assert_eq!(out.status.code(), Some(exit_codes::FAILED));
    assert!(stderr(&out).contains("empty instructions"));
    assert!(!repo.has_branch("papagai/latest"));
}

#[test]
fn dry_run_prints_command_and_cleans_up() {
    let repo = TestRepo::new().expect("repo");
    let out = papagai(
        &repo,
        &["--dry-run", "do", "--isolation", "worktree"],
        Some("fix everything on {BRANCH}"),
    );

    assert_eq!(out.status.code(), Some(exit_codes::OK), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Would execute command:"));
    assert!(text.contains("claude --allowed-tools"));
    assert!(text.contains("fix everything on main"));
    assert!(text.contains("My work here is done. Check out branch papagai/main-"));
    assert!(repo.has_branch("papagai/latest"));
    assert!(!repo.path().join("papagai").exists());
}

#[test]
fn configured_agent_runs_in_workspace() {
    let repo = TestRepo::new().expect("repo");
    write_user_config(
        &repo,
        "isolation = \"worktree\"\n[agent]\ncommand = [\"sh\", \"-c\", \"echo from-agent > agent.txt\", \"sh\"]\n",
    );
    let instructions = repo.cache_root().join("task.md");
    fs::write(&instructions, "write a file").expect("write");

    let out = papagai(&repo, &["do", &instructions.to_string_lossy(), "-b", "result"], None);

    assert_eq!(out.status.code(), Some(exit_codes::OK), "{}", stderr(&out));
    assert!(stdout(&out).contains("Check out branch result"));
    let file = repo.git(&["show", "result:agent.txt"]).expect("show");
    assert_eq!(file.trim(), "from-agent");
    assert!(!repo.path().join("agent.txt").exists());
}

#[test]
fn failing_agent_exits_non_zero() {
    let repo = TestRepo::new().expect("repo");
    write_user_config(&repo, "[agent]\ncommand = [\"false\"]\n");

    let out = papagai(&repo, &["do", "--isolation", "worktree"], Some("anything"));

    assert_eq!(out.status.code(), Some(exit_codes::FAILED));
    assert!(stderr(&out).contains("agent invocation failed"));
    assert!(!repo.path().join("papagai").exists());
}

#[test]
fn invalid_config_is_reported() {
    let repo = TestRepo::new().expect("repo");
    write_user_config(&repo, "[agent]\ncommand = []\n");
    let out = papagai(&repo, &["task", "--list"], None);
    assert_eq!(out.status.code(), Some(exit_codes::FAILED));
    assert!(stderr(&out).contains("agent.command"));
}

#[test]
fn purge_removes_branches() {
    let repo = TestRepo::new().expect("repo");
    repo.git(&["branch", "papagai/main-20260101-1200-deadbeef"]).expect("branch");
    repo.git(&["branch", "papagai/latest"]).expect("branch");
    repo.git(&["branch", "keep-me"]).expect("branch");

    let out = papagai(&repo, &["purge"], None);

    assert_eq!(out.status.code(), Some(exit_codes::OK), "{}", stderr(&out));
    assert!(stdout(&out).contains("Deleted branch: papagai/latest"));
    assert!(!repo.has_branch("papagai/main-20260101-1200-deadbeef"));
    assert!(!repo.has_branch("papagai/latest"));
    assert!(repo.has_branch("keep-me"));
}

#[test]
fn purge_no_branches_keeps_them() {
    let repo = TestRepo::new().expect("repo");
    repo.git(&["branch", "papagai/main-1"]).expect("branch");

    let out = papagai(&repo, &["purge", "--no-branches"], None);

    assert_eq!(out.status.code(), Some(exit_codes::OK), "{}", stderr(&out));
    assert!(repo.has_branch("papagai/main-1"));
}

#[test]
fn outside_a_repository_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = Command::new(env!("CARGO_BIN_EXE_papagai"))
        .current_dir(temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join("config"))
        .env("XDG_CACHE_HOME", temp.path().join("cache"))
        .arg("purge")
        .output()
        .expect("run papagai");
    assert_eq!(out.status.code(), Some(exit_codes::FAILED));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Error purging"));
}
