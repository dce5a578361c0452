//! Pure logic: naming, strategy selection, porcelain parsing. No I/O.

pub mod isolation;
pub mod naming;
pub mod worktree_list;
