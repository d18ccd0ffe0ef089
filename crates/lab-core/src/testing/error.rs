//! Error types for test cases.

use std::time::Duration;

use crate::runtime::RuntimeError;
use crate::sources::DiscoveryError;

/// Why a case could not be built or did not pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaseError {
    /// The file could not be discovered or read.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("unknown file type: {0}")]
    UnknownFileType(String),

    #[error("invalid suite manifest: {0}")]
    Manifest(String),

    #[error("resolve {script} script: {source}")]
    Resolve {
        script: &'static str,
        source: DiscoveryError,
    },

    /// A unit script failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("failed to execute query script: {0}")]
    Query(RuntimeError),

    #[error("deserialize query output: {0}")]
    Output(String),

    #[error("assertion failed: {0}")]
    Assertion(RuntimeError),

    /// A must-fail unit succeeded.
    #[error("expected to fail")]
    ExpectedToFail,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

/// Result type for case construction and execution.
pub type CaseResult<T> = std::result::Result<T, CaseError>;
