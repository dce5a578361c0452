//! papagai: hand a task to a coding agent and get a branch back.
//!
//! Every subcommand that runs the agent does so in a fresh workspace on a
//! `papagai/...` branch; the user's own checkout is never touched.

use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};

use papagai::core::isolation::Isolation;
use papagai::core::naming::Namespace;
use papagai::exit_codes;
use papagai::io::agent::ClaudeAgent;
use papagai::io::config::{PapagaiConfig, load_default_config};
use papagai::io::instructions::Instructions;
use papagai::io::purge::{PurgeOptions, purge};
use papagai::io::tasks::{self, Primer};
use papagai::logging;
use papagai::run::{RunRequest, run_task};

#[derive(Parser, Debug)]
#[command(
    name = "papagai",
    version,
    about = "Automate code changes with a coding agent on isolated git worktrees"
)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Show the agent command that would be executed without running it.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
struct WorkArgs {
    /// Branch to base the work on.
    #[arg(long, default_value = "HEAD")]
    base_branch: String,

    /// Target branch to work on (created if needed, work is merged into it).
    #[arg(short = 'b', long = "branch")]
    target_branch: Option<String>,

    /// auto (overlayfs if available), worktree, or overlayfs.
    #[arg(long, value_enum)]
    isolation: Option<Isolation>,

    /// Keep the worktree/overlay after completion.
    #[arg(long, overrides_with = "no_keep")]
    keep: bool,

    #[arg(long, overrides_with = "keep")]
    no_keep: bool,
}

impl WorkArgs {
    fn keep(&self, default: bool) -> bool {
        if self.keep {
            true
        } else if self.no_keep {
            false
        } else {
            default
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tell the agent to do something on a work tree, instructions from FILE or stdin.
    Do {
        instructions_file: Option<PathBuf>,
        #[command(flatten)]
        work: WorkArgs,
    },
    /// Like `do`, but primes the agent as a software engineer.
    Code {
        instructions_file: Option<PathBuf>,
        #[command(flatten)]
        work: WorkArgs,
    },
    /// Review the current branch; comments land on a `papagai/review/...` branch.
    Review {
        #[command(flatten)]
        work: WorkArgs,
    },
    /// Run a pre-written task, built in or from $XDG_CONFIG_HOME/papagai/tasks.
    Task {
        /// List all available tasks.
        #[arg(long)]
        list: bool,

        name: Option<String>,

        /// Branch to base the work on.
        #[arg(long, default_value = "HEAD")]
        base_branch: String,
    },
    /// Remove branches, worktrees and overlays left behind by papagai.
    Purge {
        #[command(flatten)]
        sweep: PurgeArgs,
    },
}

/// Every sweep is on unless switched off; the last flag of a pair wins.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
struct PurgeArgs {
    /// Delete papagai branches.
    #[arg(long, overrides_with = "no_branches")]
    branches: bool,
    #[arg(long, overrides_with = "branches")]
    no_branches: bool,

    /// Remove papagai worktrees.
    #[arg(long, overrides_with = "no_worktrees")]
    worktrees: bool,
    #[arg(long, overrides_with = "worktrees")]
    no_worktrees: bool,

    /// Unmount and remove overlay directories.
    #[arg(long, overrides_with = "no_overlays")]
    overlays: bool,
    #[arg(long, overrides_with = "overlays")]
    no_overlays: bool,
}

impl PurgeArgs {
    fn options(&self) -> PurgeOptions {
        PurgeOptions {
            branches: self.branches || !self.no_branches,
            worktrees: self.worktrees || !self.no_worktrees,
            overlays: self.overlays || !self.no_overlays,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            exit_codes::FAILED
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let cfg = load_default_config()?;
    let repo_dir = env::current_dir()
        .and_then(|dir| dir.canonicalize())
        .context("resolve current directory")?;

    match cli.command {
        Command::Do {
            instructions_file,
            work,
        } => {
            let instructions = read_instructions(instructions_file.as_deref())?;
            execute(&cfg, &repo_dir, &work, None, instructions, cli.dry_run)
        }
        Command::Code {
            instructions_file,
            work,
        } => {
            let user = read_instructions(instructions_file.as_deref())?;
            let instructions = tasks::primer(Primer::Code).combine(&user);
            execute(&cfg, &repo_dir, &work, None, instructions, cli.dry_run)
        }
        Command::Review { work } => {
            let instructions = tasks::primer(Primer::Review);
            execute(&cfg, &repo_dir, &work, Some("review"), instructions, cli.dry_run)
        }
        Command::Task {
            list,
            name,
            base_branch,
        } => cmd_task(&cfg, &repo_dir, list, name.as_deref(), base_branch, cli.dry_run),
        Command::Purge { sweep } => cmd_purge(&cfg, &repo_dir, &sweep.options()),
    }
}

fn read_instructions(file: Option<&Path>) -> Result<Instructions> {
    let instructions = match file {
        Some(path) => Instructions::from_file(path)?,
        None => {
            let mut stdin = io::stdin();
            if stdin.is_terminal() {
                eprintln!("Please tell me what you want me to do (Ctrl+D to complete)");
            }
            let mut text = String::new();
            stdin.read_to_string(&mut text).context("read instructions from stdin")?;
            Instructions::from_text(text)
        }
    };
    if instructions.is_empty() {
        bail!("empty instructions. That's it, I can't work under these conditions!");
    }
    Ok(instructions)
}

fn execute(
    cfg: &PapagaiConfig,
    repo_dir: &Path,
    work: &WorkArgs,
    purpose: Option<&str>,
    instructions: Instructions,
    dry_run: bool,
) -> Result<i32> {
    let request = RunRequest {
        base_ref: work.base_branch.clone(),
        target_branch: work.target_branch.clone(),
        purpose: purpose.map(str::to_string),
        isolation: work.isolation.unwrap_or(cfg.isolation),
        keep: work.keep(cfg.keep),
        extra_tools: cfg.agent.allowed_tools.clone(),
        dry_run,
        ..RunRequest::new(repo_dir, instructions)
    };
    run_request(cfg, &request)
}

fn run_request(cfg: &PapagaiConfig, request: &RunRequest) -> Result<i32> {
    let agent = ClaudeAgent::from_config(&cfg.agent);
    let cache_root = cfg.cache_root()?;
    let outcome = match run_task(&agent, &Namespace::default(), &cache_root, request) {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(branch) = err.recovery_branch() {
                eprintln!("Work is available in branch {branch}");
            }
            return Err(err.into());
        }
    };

    if outcome.needs_attention() {
        eprintln!(
            "Work is available in branch {}; see the log above to finish cleanup",
            outcome.deliverable()
        );
        return Ok(exit_codes::FAILED);
    }
    println!(
        "My work here is done. Check out branch {}",
        outcome.deliverable()
    );
    Ok(exit_codes::OK)
}

fn cmd_task(
    cfg: &PapagaiConfig,
    repo_dir: &Path,
    list: bool,
    name: Option<&str>,
    base_branch: String,
    dry_run: bool,
) -> Result<i32> {
    let user_dir = tasks::user_task_dir();
    let name = match (list, name) {
        (false, Some(name)) => name,
        (list, _) => {
            if !list {
                eprintln!("Error: missing task name. Available tasks:");
            }
            let available = tasks::list_tasks(user_dir.as_deref());
            if available.is_empty() {
                eprintln!("No tasks with descriptions found.");
                return Ok(exit_codes::FAILED);
            }
            print!("{}", tasks::format_task_list(&available));
            return Ok(if list { exit_codes::OK } else { exit_codes::FAILED });
        }
    };

    let Some(task) = tasks::find_task(user_dir.as_deref(), name)? else {
        bail!("task '{name}' not found; run 'papagai task --list' to see available tasks");
    };
    let request = RunRequest {
        base_ref: base_branch,
        isolation: cfg.isolation,
        keep: cfg.keep,
        extra_tools: cfg.agent.allowed_tools.clone(),
        dry_run,
        ..RunRequest::new(repo_dir, task.instructions)
    };
    run_request(cfg, &request)
}

fn cmd_purge(cfg: &PapagaiConfig, repo_dir: &Path, options: &PurgeOptions) -> Result<i32> {
    let cache_root = cfg.cache_root()?;
    let report = purge(repo_dir, &Namespace::default(), &cache_root, options);

    for path in &report.removed_worktrees {
        println!("Removed worktree: {}", path.display());
    }
    for path in &report.removed_overlays {
        println!("Removed overlay directory: {}", path.display());
    }
    for path in &report.left_overlays {
        println!("Left overlay in place (unmount failed): {}", path.display());
    }
    for branch in &report.deleted_branches {
        println!("Deleted branch: {branch}");
    }
    for failure in &report.failures {
        eprintln!(
            "Error purging {:?}: {}: {}",
            failure.kind, failure.target, failure.reason
        );
    }
    Ok(if report.is_success() {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_do_defaults() {
        let cli = Cli::parse_from(["papagai", "do", "task.md"]);
        let Command::Do {
            instructions_file,
            work,
        } = cli.command
        else {
            panic!("expected do");
        };
        assert_eq!(instructions_file, Some(PathBuf::from("task.md")));
        assert_eq!(work.base_branch, "HEAD");
        assert_eq!(work.target_branch, None);
        assert_eq!(work.isolation, None);
        assert!(!work.keep(false));
        assert!(work.keep(true));
    }

    #[test]
    fn parse_code_with_options() {
        let cli = Cli::parse_from([
            "papagai",
            "-vv",
            "--dry-run",
            "code",
            "--base-branch",
            "dev",
            "-b",
            "feature",
            "--isolation",
            "worktree",
            "--keep",
        ]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.dry_run);
        let Command::Code { work, .. } = cli.command else {
            panic!("expected code");
        };
        assert_eq!(work.base_branch, "dev");
        assert_eq!(work.target_branch.as_deref(), Some("feature"));
        assert_eq!(work.isolation, Some(Isolation::Worktree));
        assert!(work.keep(false));
    }

    #[test]
    fn last_keep_flag_wins() {
        let cli = Cli::parse_from(["papagai", "review", "--keep", "--no-keep"]);
        let Command::Review { work } = cli.command else {
            panic!("expected review");
        };
        assert!(!work.keep(true));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["papagai", "review", "--dry-run", "-v"]);
        assert!(cli.dry_run);
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn parse_isolation_aliases() {
        let cli = Cli::parse_from(["papagai", "do", "--isolation", "overlayfs"]);
        let Command::Do { work, .. } = cli.command else {
            panic!("expected do");
        };
        assert_eq!(work.isolation, Some(Isolation::Overlayfs));
        assert!(Cli::try_parse_from(["papagai", "do", "--isolation", "chroot"]).is_err());
    }

    #[test]
    fn parse_task_and_purge() {
        let cli = Cli::parse_from(["papagai", "task", "--list"]);
        assert!(matches!(cli.command, Command::Task { list: true, name: None, .. }));

        let cli = Cli::parse_from(["papagai", "task", "docs/readme", "--base-branch", "main"]);
        let Command::Task {
            name, base_branch, ..
        } = cli.command
        else {
            panic!("expected task");
        };
        assert_eq!(name.as_deref(), Some("docs/readme"));
        assert_eq!(base_branch, "main");

        let cli = Cli::parse_from(["papagai", "purge", "--no-overlays"]);
        let Command::Purge { sweep } = cli.command else {
            panic!("expected purge");
        };
        assert_eq!(
            sweep.options(),
            PurgeOptions {
                branches: true,
                worktrees: true,
                overlays: false,
            }
        );
    }

    #[test]
    fn purge_toggles_accept_both_forms() {
        let parse = |args: &[&str]| {
            let cli = Cli::parse_from(["papagai", "purge"].iter().chain(args).copied());
            let Command::Purge { sweep } = cli.command else {
                panic!("expected purge");
            };
            sweep.options()
        };

        assert_eq!(parse(&[]), PurgeOptions::default());
        assert_eq!(parse(&["--branches", "--worktrees", "--overlays"]), PurgeOptions::default());
        let only_branches = parse(&["--no-worktrees", "--no-overlays", "--branches"]);
        assert!(only_branches.branches);
        assert!(!only_branches.worktrees);
        assert!(!only_branches.overlays);
        assert!(!parse(&["--branches", "--no-branches"]).branches);
        assert!(parse(&["--no-branches", "--branches"]).branches);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
