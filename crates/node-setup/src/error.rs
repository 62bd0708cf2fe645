//! Error taxonomy shared by every setup component.

use std::path::PathBuf;

pub type Result<T, E = SetupError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// Wrong OS, missing privileges, missing template, port in use, etc.
    /// Never retried.
    #[error("{0}")]
    Precondition(String),

    /// An external command exited non-zero under abort-on-failure.
    #[error("command failed (exit {code}): {command}")]
    CommandFailed { command: String, code: i32 },

    /// The command could not be spawned at all.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid answer '{answer}' for {question} (expected one of: {expected})")]
    InvalidAnswer {
        question: String,
        answer: String,
        expected: String,
    },

    #[error("no answer for {0} and it has no default")]
    Unanswered(String),

    #[error("unknown service '{0}'")]
    UnknownService(String),
}

impl SetupError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SetupError::Io { path: path.into(), source }
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        SetupError::Precondition(msg.into())
    }
}
