//! Core error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the graph store, persistence and report assembly.
///
/// Recoverable conditions (`ParseFailed`, `SemanticConflict`, truncation)
/// are carried as values, never as errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A dangling edge, orphaned declaration or broken reverse index.
    #[error("graph invariant violated: {0}")]
    GraphInvariantViolation(String),

    /// An impact result that could not have come from the propagator.
    #[error("malformed impact result: {0}")]
    MalformedResult(String),

    /// I/O error while persisting or loading state
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Persisted state written by an incompatible version
    #[error("unsupported state format {found} in {path} (expected {expected})")]
    UnsupportedFormat {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}

impl From<bincode::Error> for CoreError {
    fn from(e: bincode::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::GraphInvariantViolation("edge into missing file".into());
        assert!(err.to_string().contains("edge into missing file"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CoreError = io_err.into();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
