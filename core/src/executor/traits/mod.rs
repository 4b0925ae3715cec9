mod progress;
mod runner;

pub use progress::{Phase, ProgressEvent, ProgressSink};
pub use runner::{Purpose, TaskInvocation, TaskRunner};
