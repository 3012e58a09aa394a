//! Error types for the core library

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Definition error: {0}")]
    Definition(String),

    #[error("Event sink is closed")]
    SinkClosed,

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The event stream of a run has a gap or a duplicate
    #[error("Sequence gap in run {run_id}: expected {expected}, found {found}")]
    SequenceGap {
        run_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Expression error: {0}")]
    Expression(String),
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Definition(err.to_string())
    }
}
