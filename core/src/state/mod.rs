//! Resumable execution state: per-task `done | failed | skipped` outcomes,
//! persisted after every result and deleted after a fully successful run.

mod manager;
mod store;
mod types;

pub use manager::StateTracker;
pub use store::StateStore;
pub use types::{ExecutionState, TaskStatus, STATE_VERSION};
