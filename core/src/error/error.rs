use thiserror::Error;

use super::plan::PlanError;
use super::vcs::VcsError;

/// Top-level engine error. Task failures are never errors; they are reported
/// through `TaskResult` exit codes. Only plan, isolation, state and
/// cancellation problems surface here.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid plan: {0}")]
    Plan(#[from] PlanError),

    #[error("isolation failed: {0}")]
    Isolation(#[from] VcsError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("run cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("spawn failed: {0}")]
    Spawn(String),

    #[error("stream io error: {stream} {source}")]
    StreamIo {
        stream: &'static str,
        source: std::io::Error,
    },

    #[error("invoker error: {0}")]
    Invoker(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("state io error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("state file {path} is not valid: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}
