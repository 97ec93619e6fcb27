//! Core building blocks shared by the release pipeline
//!
//! - **config**: run parameters, validation and redacted display
//! - **error**: error categories with contextual help messages and exit codes
//! - **vcs**: git operations abstraction (SystemGit)
//! - **worktree**: scoped checkout of the pages branch

pub mod config;
pub mod error;
pub mod vcs;
pub mod worktree;
