//! Version-control isolation for parallel work.
//!
//! The base checkout belongs to the coordinator. Every feature of a
//! multi-feature wave gets a worktree on `wave-N/<feature>`, and every task of
//! a parallel level inside a feature gets one on `wave-N/<feature>--<task>`.
//! Results merge back up the same path; conflicts are reported, never
//! resolved.

mod manager;
mod types;
mod vcs;

pub use manager::{IsolationManager, IsolationSettings};
pub use types::{
    CleanupReport, CommitOutcome, FeatureWorktree, MergeOutcome, MergeResult, SubWorktree,
    VcsOutcome, Workspace,
};
pub use vcs::Vcs;
