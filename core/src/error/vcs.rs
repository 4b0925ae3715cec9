use thiserror::Error;

/// Version-control failures. "Nothing to do" situations (nothing to commit,
/// branch already gone) are not errors; they come back as outcome values.
#[derive(Error, Debug)]
pub enum VcsError {
    #[error("spawn git {args}: {source}")]
    Spawn {
        args: String,
        source: std::io::Error,
    },

    #[error("git {args} failed: {stderr}")]
    Command { args: String, stderr: String },

    #[error("{0} is not a git repository")]
    NotARepository(String),

    #[error("git command cancelled")]
    Cancelled,

    #[error("unexpected git output: {0}")]
    Output(String),
}
