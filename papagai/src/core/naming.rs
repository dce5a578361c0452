//! Branch naming for workspaces and bookkeeping refs.

use chrono::Local;
use rand::Rng;

/// Default tool name; every branch the tool creates lives under `papagai/`.
pub const TOOL_NAME: &str = "papagai";

/// How many fresh suffixes to try before giving up on finding an unused name.
pub const MAX_NAME_ATTEMPTS: usize = 16;

/// Branch namespace owned by one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    tool: String,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(TOOL_NAME)
    }
}

impl Namespace {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// `<tool>/`
    pub fn prefix(&self) -> String {
        format!("{}/", self.tool)
    }

    /// `<tool>/` or `<tool>/<purpose>/` for purpose-tagged runs such as reviews.
    pub fn branch_prefix(&self, purpose: Option<&str>) -> String {
        match purpose.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
            Some(purpose) => format!("{}/{}/", self.tool, purpose),
            None => self.prefix(),
        }
    }

    /// The pointer branch that tracks the most recent run.
    pub fn latest_branch(&self) -> String {
        format!("{}/latest", self.tool)
    }

    /// Glob matching every branch in this namespace (for `git branch --list`).
    pub fn branch_glob(&self) -> String {
        format!("{}/*", self.tool)
    }

    /// True when a short branch name (`papagai/...`) belongs to this namespace.
    pub fn owns_branch(&self, branch: &str) -> bool {
        branch.starts_with(&self.prefix())
    }

    /// True when a full ref (`refs/heads/papagai/...`) belongs to this namespace.
    pub fn owns_ref(&self, full_ref: &str) -> bool {
        full_ref
            .strip_prefix("refs/heads/")
            .is_some_and(|branch| self.owns_branch(branch))
    }
}

/// `{base}-{timestamp}-{suffix}`, the prefix-independent part of a workspace branch.
pub fn branch_stem(base_branch: &str, timestamp: &str, suffix: &str) -> String {
    format!("{base_branch}-{timestamp}-{suffix}")
}

/// Apply a namespace prefix to a stem.
pub fn prefixed_branch(prefix: &str, stem: &str) -> String {
    format!("{prefix}{stem}")
}

/// Produce a fresh stem for `base_branch`, skipping any candidate `taken` reports as in use.
///
/// Returns `None` only if every attempt collided.
pub fn fresh_stem(base_branch: &str, taken: impl Fn(&str) -> bool) -> Option<String> {
    let timestamp = generate_timestamp();
    (0..MAX_NAME_ATTEMPTS)
        .map(|_| branch_stem(base_branch, &timestamp, &generate_suffix()))
        .find(|stem| !taken(stem))
}

fn generate_timestamp() -> String {
    Local::now().format("%Y%m%d-%H%M").to_string()
}

fn generate_suffix() -> String {
    format!("{:08x}", rand::thread_rng().r#gen::<u32>())
}
