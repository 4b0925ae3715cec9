use thiserror::Error;
use weaver_core::{EngineError, StateError, VcsError};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Plan(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Process exit code for an error.
///
/// 0 success, 1 plan did not pass, 11 config, 12 invalid plan, 20 io or
/// state, 30 version control, 50 internal, 130 interrupted.
pub fn exit_code_for_error(e: &CliError) -> i32 {
    match e {
        CliError::Config(_) => 11,
        CliError::Plan(_) => 12,
        CliError::Engine(engine) => match engine {
            EngineError::Plan(_) => 12,
            EngineError::Isolation(_) => 30,
            EngineError::State(_) => 20,
            EngineError::Supervisor(_) => 20,
            EngineError::Cancelled => 130,
        },
        CliError::State(_) => 20,
        CliError::Vcs(VcsError::Cancelled) => 130,
        CliError::Vcs(_) => 30,
        CliError::Io(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

#[cfg(test)]
mod tests {
    use weaver_core::PlanError;

    use super::*;

    #[test]
    fn engine_errors_map_by_cause() {
        let invalid = CliError::from(EngineError::from(PlanError::SelfDependency("a".into())));
        assert_eq!(exit_code_for_error(&invalid), 12);
        assert_eq!(exit_code_for_error(&CliError::from(EngineError::Cancelled)), 130);
        let vcs = CliError::from(VcsError::NotARepository("/tmp".into()));
        assert_eq!(exit_code_for_error(&vcs), 30);
    }
}
