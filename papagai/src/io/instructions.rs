//! Markdown instruction files with an optional frontmatter header.
//!
//! ```text
//! ---
//! description: Fix all typos
//! tools: Bash(cargo test:*), Edit(./**)
//! ---
//! Go through the repository and fix typos.
//! ```
//!
//! Frontmatter values may continue over several lines. A header without a
//! closing `---` is not a header at all; the whole file is the text.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

static KEY_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_-]+):\s*(.*)$").expect("frontmatter pattern is valid")
});

const DELIMITER: &str = "---";

/// Placeholder replaced by the branch the work is based on.
pub const BRANCH_PLACEHOLDER: &str = "{BRANCH}";
/// Placeholder replaced by the workspace branch the agent commits to.
pub const WORKSPACE_BRANCH_PLACEHOLDER: &str = "{WORKTREE_BRANCH}";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instructions {
    pub frontmatter: BTreeMap<String, String>,
    pub text: String,
    /// `description` from the frontmatter, empty if absent.
    pub description: String,
    /// `tools` from the frontmatter, split on top-level commas.
    pub tools: Vec<String>,
}

impl Instructions {
    /// Plain text with no frontmatter, e.g. instructions read from stdin.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn parse(content: &str) -> Self {
        let (frontmatter, text) = split_frontmatter(content);
        let description = frontmatter.get("description").cloned().unwrap_or_default();
        let tools = frontmatter
            .get("tools")
            .map(|t| parse_tools(t))
            .unwrap_or_default();
        Self {
            frontmatter,
            text,
            description,
            tools,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("read instructions {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    /// True when there is nothing for the agent to do.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// `self` followed by `other`.
    ///
    /// Tools are merged without duplicates, the description is `self`'s and
    /// `self` wins on conflicting frontmatter keys.
    pub fn combine(&self, other: &Instructions) -> Instructions {
        let mut tools = self.tools.clone();
        for tool in &other.tools {
            if !tools.contains(tool) {
                tools.push(tool.clone());
            }
        }
        let mut frontmatter = other.frontmatter.clone();
        frontmatter.extend(self.frontmatter.clone());
        Instructions {
            frontmatter,
            text: format!("{}\n{}", self.text, other.text),
            description: self.description.clone(),
            tools,
        }
    }

    /// Text with both branch placeholders filled in.
    pub fn substitute(&self, base_branch: &str, workspace_branch: &str) -> String {
        self.text
            .replace(BRANCH_PLACEHOLDER, base_branch)
            .replace(WORKSPACE_BRANCH_PLACEHOLDER, workspace_branch)
    }
}

fn split_frontmatter(content: &str) -> (BTreeMap<String, String>, String) {
    let lines: Vec<&str> = content.split('\n').collect();
    if lines.first().map(|l| l.trim()) != Some(DELIMITER) {
        return (BTreeMap::new(), content.to_string());
    }

    let mut frontmatter = BTreeMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;
    for (idx, line) in lines.iter().enumerate().skip(1) {
        if line.trim() == DELIMITER {
            if let Some((key, value)) = current.take() {
                frontmatter.insert(key, value.join("\n").trim().to_string());
            }
            return (frontmatter, lines[idx + 1..].join("\n"));
        }
        if let Some(caps) = KEY_VALUE_RE.captures(line) {
            if let Some((key, value)) = current.take() {
                frontmatter.insert(key, value.join("\n").trim().to_string());
            }
            let key = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let value = caps.get(2).map_or("", |m| m.as_str());
            current = Some((key, vec![value]));
        } else if let Some((_, value)) = current.as_mut() {
            value.push(line);
        }
    }
    (BTreeMap::new(), content.to_string())
}

/// Split on commas that are not nested inside `()` or `{}`.
pub fn parse_tools(tools: &str) -> Vec<String> {
    let mut parsed = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in tools.chars() {
        match ch {
            '(' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                push_tool(&mut parsed, &current);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    push_tool(&mut parsed, &current);
    parsed
}

fn push_tool(tools: &mut Vec<String>, raw: &str) {
    let tool = raw.trim();
    if !tool.is_empty() {
        tools.push(tool.to_string());
    }
}
