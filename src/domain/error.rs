use thiserror::Error;

/// Common error types for the journal
#[derive(Error, Debug, Clone)]
pub enum JournalError {
    /// Precondition violations (non-retriable, surfaced synchronously)
    #[error("{0}")]
    Precondition(String),

    /// Requested operation is disabled by configuration
    #[error("{0}")]
    Unsupported(String),

    /// Event or metadata serialization errors
    #[error("{0}")]
    Serialization(String),

    /// Stored payload could not be decoded
    #[error("{0}")]
    Deserialization(String),

    /// Backing-store execution errors
    #[error("{0}")]
    Execution(String),

    /// Per-entity delete queue is full
    #[error("{0}")]
    Backpressure(String),

    /// Replay errors
    #[error("{0}")]
    Replay(String),

    /// Actor system errors
    #[error("{0}")]
    Actor(String),

    /// Timeout errors
    #[error("{0}")]
    Timeout(String),

    /// Generic errors with context
    #[error("{0}")]
    Generic(String)
}

/// Convert from serde_json::Error
impl From<serde_json::Error> for JournalError {
    fn from(err: serde_json::Error) -> Self {
        JournalError::Serialization(err.to_string())
    }
}

/// Convert from ractor::SpawnErr
impl From<ractor::SpawnErr> for JournalError {
    fn from(err: ractor::SpawnErr) -> Self {
        JournalError::Actor(err.to_string())
    }
}
