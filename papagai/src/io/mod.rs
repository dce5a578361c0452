//! Side effects: processes, git, the filesystem and the external agent.

pub mod agent;
pub mod branches;
pub mod config;
pub mod git;
pub mod instructions;
pub mod latest;
pub mod process;
pub mod prompt;
pub mod purge;
pub mod reconcile;
pub mod tasks;
pub mod workspace;
