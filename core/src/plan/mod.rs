//! Plan data model consumed by the engine.
//!
//! Plans are produced by an external parser; the engine only validates
//! dependency scoping and executes them.

mod model;
mod validate;

pub use model::{AgentRole, Feature, Plan, Section, Task, Wave};
pub use validate::{collect_plan_errors, validate_plan};
