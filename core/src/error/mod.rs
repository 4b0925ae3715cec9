#[allow(clippy::module_inception)]
pub mod error;
pub mod plan;
pub mod vcs;

pub use error::{EngineError, StateError, SupervisorError};
pub use plan::PlanError;
pub use vcs::VcsError;
