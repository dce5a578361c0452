//! Stable exit codes for papagai CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Anything failed: bad arguments, agent failure, diverged target, purge errors.
pub const FAILED: i32 = 1;
