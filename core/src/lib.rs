//! Execution engine for wave-structured, multi-agent code changes.
//!
//! The engine takes a parsed [`plan::Plan`] and drives it to completion:
//!
//! - [`executor`] levels each task section into a dependency DAG and runs the
//!   levels with bounded concurrency, fail-fast skip propagation and a single
//!   fix cycle for failed verifications.
//! - [`runner`] supervises one external agent process per task invocation and
//!   intervenes when the agent stalls, hangs, or exceeds its time budget.
//! - [`isolation`] gives every parallel unit of work its own branch and
//!   worktree, merging results back up the feature / sub-task hierarchy.
//! - [`state`] persists per-task outcomes so an interrupted run can resume.

pub mod config;
pub mod error;
pub mod executor;
pub mod isolation;
pub mod plan;
pub mod runner;
pub mod state;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{EngineError, PlanError, StateError, SupervisorError, VcsError};
