//! Error types for the sources module.

use std::fmt;

/// A failure to discover or read a single location.
///
/// The identifier is whatever the backend uses to name the unit it failed
/// on: a file path, a path inside a repository, or a URL.
///
/// Errors about one file are reported and discovery goes on. A fatal error
/// means the backend itself could not be read (missing root, failed clone,
/// unreachable URL) and ends an aggregated discovery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{filename}: {message}")]
pub struct DiscoveryError {
    pub filename: String,
    pub message: String,
    pub fatal: bool,
}

impl DiscoveryError {
    pub fn new(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            message: message.into(),
            fatal: false,
        }
    }

    /// Mark the error as a failure of the whole backend.
    pub fn into_fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    /// Wrap any displayable error under the given identifier.
    pub fn from_error(filename: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(filename, err.to_string())
    }
}

/// Errors raised while constructing a source from a location string.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("unknown location provider: {0}")]
    UnknownScheme(String),

    #[error("invalid location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("invalid filter pattern: {0}")]
    InvalidFilter(#[from] globset::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for source construction.
pub type SourceResult<T> = std::result::Result<T, SourceError>;
