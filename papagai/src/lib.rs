//! Run a coding agent on a throwaway copy of a git repository.
//!
//! Every run gets its own branch and its own checkout, so the agent can never
//! touch the user's working tree. When the run ends, whatever the agent left
//! uncommitted is committed, the `papagai/latest` pointer is moved and the
//! checkout is removed; the branch stays behind as the result.
//!
//! - **[`core`]**: Pure logic (branch naming, strategy selection, porcelain
//!   parsing). No I/O.
//! - **[`io`]**: Side effects: git, `fuse-overlayfs`, the filesystem, the agent
//!   process.
//!
//! [`run`] ties them together for one invocation; the binary in `main.rs` is
//! thin CLI glue around it.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::{Error, Result};
