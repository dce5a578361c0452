//! Parser for `git worktree list --porcelain`.

use std::path::PathBuf;

/// One registered worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    /// Full ref (`refs/heads/...`); `None` for detached or bare entries.
    pub branch_ref: Option<String>,
}

/// Parse porcelain output: attribute lines, entries separated by blank lines.
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<WorktreeEntry> = None;
    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(WorktreeEntry {
                path: PathBuf::from(path),
                branch_ref: None,
            });
        } else if let Some(branch) = line.strip_prefix("branch ")
            && let Some(entry) = current.as_mut()
        {
            entry.branch_ref = Some(branch.trim().to_string());
        }
    }
    if let Some(entry) = current {
        entries.push(entry);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_entries() {
        let out = "worktree /repo\nHEAD 1111\nbranch refs/heads/main\n\n\
                   worktree /repo/papagai/main-1\nHEAD 2222\nbranch refs/heads/papagai/main-1\n\n\
                   worktree /tmp/detached\nHEAD 3333\ndetached\n";
        let entries = parse_worktree_list(out);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].path, PathBuf::from("/repo"));
        assert_eq!(entries[0].branch_ref.as_deref(), Some("refs/heads/main"));
        assert_eq!(
            entries[1].branch_ref.as_deref(),
            Some("refs/heads/papagai/main-1")
        );
        assert_eq!(entries[2].branch_ref, None);
    }

    #[test]
    fn empty_output_has_no_entries() {
        assert!(parse_worktree_list("").is_empty());
    }
}
