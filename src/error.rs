//! Centralized error types for slowpost.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the slowpost library.
#[derive(Error, Debug)]
pub enum PostError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No letter with this id exists in the store.
    #[error("Letter not found: {0}")]
    NotFound(String),

    /// The letter has already reached its terminal state.
    #[error("Letter already delivered: {0}")]
    AlreadyDelivered(String),

    /// Missing or invalid configuration, template, or credential file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A template could not be loaded or rendered.
    #[error("Template '{name}': {reason}")]
    Template { name: String, reason: String },

    /// The letter store rejected a query or write.
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// JSON (de)serialization of a postal snapshot or token failed.
    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The mail transport failed to build or send a message.
    #[error("Mail error: {0}")]
    Mail(String),

    /// Obtaining or refreshing mail credentials failed.
    #[error("Authorization error: {0}")]
    Auth(String),

    /// The text generator failed or returned nothing usable.
    #[error("Text generation error: {0}")]
    TextGeneration(String),

    /// A stored timestamp could not be parsed.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A stored status is not one of the known states.
    #[error("Invalid letter status: {0}")]
    InvalidStatus(String),
}

/// How a failure is handled by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown letter id. Reported and skipped.
    NotFound,
    /// Mail, text generation, or network failure. Retried on the next sweep.
    TransientExternalFailure,
    /// Unparseable stored data. Recovered by defaulting.
    MalformedInput,
    /// Missing template, credential, or config file. Fatal at startup.
    ConfigurationError,
}

/// Convenience alias for `Result<T, PostError>`.
pub type Result<T> = std::result::Result<T, PostError>;

impl PostError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::AlreadyDelivered(_) => ErrorKind::NotFound,
            Self::InvalidTimestamp(_) | Self::InvalidStatus(_) | Self::Serde(_) => {
                ErrorKind::MalformedInput
            }
            Self::Config(_) | Self::Template { .. } => ErrorKind::ConfigurationError,
            Self::Io { .. }
            | Self::Store(_)
            | Self::Mail(_)
            | Self::Auth(_)
            | Self::TextGeneration(_) => ErrorKind::TransientExternalFailure,
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare; prefer `PostError::io`).
impl From<std::io::Error> for PostError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(PostError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            PostError::Mail("timeout".into()).kind(),
            ErrorKind::TransientExternalFailure
        );
        assert_eq!(
            PostError::InvalidTimestamp("??".into()).kind(),
            ErrorKind::MalformedInput
        );
        assert_eq!(
            PostError::Config("missing".into()).kind(),
            ErrorKind::ConfigurationError
        );
    }

    #[test]
    fn test_io_carries_path() {
        let err = PostError::io(
            "/tmp/missing.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing.txt"));
    }
}
