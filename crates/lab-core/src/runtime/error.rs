//! Error types for runtimes.

/// Errors produced by a [`super::Runtime`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// The query itself failed: compilation or evaluation.
    #[error("query failed: {0}")]
    Query(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("process error: {0}")]
    Process(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for RuntimeError {
    fn from(err: reqwest::Error) -> Self {
        RuntimeError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        RuntimeError::Serialization(err.to_string())
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
