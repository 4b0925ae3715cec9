//! Wave execution.
//!
//! ```text
//! Plan
//!   -> validate_plan()            duplicate ids, unknown deps, cycles, cross-section deps
//!   -> execute_wave() per wave    stops at the first wave that does not pass
//!        foundation               execute_dag(.., 1) in the base workspace
//!        features                 one worktree per feature when there are several,
//!                                 sub-worktrees for parallel levels inside a feature
//!        merge                    passed features into the base, in plan order
//!        integration              execute_dag(.., 1) with a fix cycle per task
//! ```
//!
//! Every task invocation goes through a [`TaskRunner`]; [`AgentTaskRunner`]
//! is the production one, backed by the agent supervisor.

mod access;
mod agent;
mod context;
mod engine;
mod feature;
pub mod graph;
mod prompt;
mod scheduler;
pub mod traits;
pub mod types;
mod wave;

pub use access::{merge_scope, AccessRules};
pub use agent::AgentTaskRunner;
pub use context::{ExecutionContext, ExecutionSettings};
pub use graph::{build_dag, validate_dag, DagLevel};
pub use engine::execute_plan;
pub use prompt::{InstructionSource, PlainInstructions, PlanContext};
pub use scheduler::{execute_dag, run_bounded, DagOutcome};
pub use traits::{Phase, ProgressEvent, ProgressSink, Purpose, TaskInvocation, TaskRunner};
pub use types::{FeatureResult, PlanResult, TaskLike, TaskResult, WaveResult, EXIT_SKIPPED};
pub use wave::execute_wave;
