mod result;
mod task;

pub use result::{FeatureResult, PlanResult, TaskResult, WaveResult, EXIT_SKIPPED};
pub use task::TaskLike;
