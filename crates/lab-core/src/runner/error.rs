//! Error types for the runner.

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("invalid {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    /// The run ended without producing a summary.
    #[error("run ended without a summary")]
    Interrupted,
}

/// Result type for runner operations.
pub type RunnerResult<T> = std::result::Result<T, RunnerError>;
