//! Pre-written tasks and the primers prepended to `code` and `review` runs.
//!
//! Built-in tasks are compiled into the binary. User tasks live as
//! `*.md` files (any depth) under `$XDG_CONFIG_HOME/papagai/tasks`; a user task
//! with the same name as a built-in one replaces it. Task names are the
//! relative path without the `.md` extension, e.g. `docs/readme`.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::io::config;
use crate::io::instructions::Instructions;

const CODE_PRIMER: &str = include_str!("../../primers/code.md");
const REVIEW_PRIMER: &str = include_str!("../../primers/review.md");

const BUILTIN_TASKS: &[(&str, &str)] = &[
    ("cleanup/dead-code", include_str!("../../tasks/cleanup/dead-code.md")),
    ("docs/readme", include_str!("../../tasks/docs/readme.md")),
    ("typos", include_str!("../../tasks/typos.md")),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primer {
    Code,
    Review,
}

pub fn primer(kind: Primer) -> Instructions {
    match kind {
        Primer::Code => Instructions::parse(CODE_PRIMER),
        Primer::Review => Instructions::parse(REVIEW_PRIMER),
    }
}

/// `$XDG_CONFIG_HOME/papagai/tasks`.
pub fn user_task_dir() -> Option<PathBuf> {
    config::config_dir().map(|dir| dir.join("tasks"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSource {
    Builtin,
    User(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub source: TaskSource,
    pub instructions: Instructions,
}

/// Look up `name`, user tasks first.
pub fn find_task(user_dir: Option<&Path>, name: &str) -> Result<Option<Task>> {
    validate_task_name(name)?;
    if let Some(dir) = user_dir {
        let path = dir.join(format!("{name}.md"));
        if path.is_file() {
            debug!(task = name, path = %path.display(), "using user task");
            return Ok(Some(Task {
                name: name.to_string(),
                instructions: Instructions::from_file(&path)?,
                source: TaskSource::User(path),
            }));
        }
    }
    Ok(BUILTIN_TASKS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(builtin, content)| Task {
            name: builtin.to_string(),
            source: TaskSource::Builtin,
            instructions: Instructions::parse(content),
        }))
}

fn validate_task_name(name: &str) -> Result<()> {
    let path = Path::new(name);
    let plain = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !plain {
        bail!("invalid task name '{name}'");
    }
    Ok(())
}

/// A listable task: one with a description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSummary {
    pub name: String,
    pub description: String,
}

/// Every task with a description, user tasks first, each group sorted by name.
///
/// Unreadable files and tasks without a description are skipped with a warning.
pub fn list_tasks(user_dir: Option<&Path>) -> Vec<TaskSummary> {
    let mut seen = BTreeSet::new();
    let mut tasks = Vec::new();

    if let Some(dir) = user_dir.filter(|d| d.is_dir()) {
        for (name, path) in user_task_files(dir) {
            match Instructions::from_file(&path) {
                Ok(md) if !md.description.is_empty() => {
                    seen.insert(name.clone());
                    tasks.push(TaskSummary {
                        name,
                        description: md.description,
                    });
                }
                Ok(_) => {
                    seen.insert(name);
                    warn!(path = %path.display(), "task file has no description");
                }
                Err(e) => {
                    seen.insert(name);
                    warn!(path = %path.display(), err = ?e, "failed to read task file");
                }
            }
        }
    }

    for (name, content) in BUILTIN_TASKS {
        if seen.contains(*name) {
            continue;
        }
        let md = Instructions::parse(content);
        if !md.description.is_empty() {
            tasks.push(TaskSummary {
                name: (*name).to_string(),
                description: md.description,
            });
        }
    }
    tasks
}

fn user_task_files(dir: &Path) -> Vec<(String, PathBuf)> {
    let mut files: Vec<(String, PathBuf)> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(err = %e, "failed to walk task directory");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "md"))
        .filter_map(|entry| {
            let rel = entry.path().strip_prefix(dir).ok()?.with_extension("");
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            Some((name, entry.into_path()))
        })
        .collect();
    files.sort();
    files
}

/// `name ... description`, names padded to a common width.
pub fn format_task_list(tasks: &[TaskSummary]) -> String {
    let width = tasks.iter().map(|t| t.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for task in tasks {
        let _ = writeln!(out, "{:<width$} ... {}", task.name, task.description);
    }
    out
}
