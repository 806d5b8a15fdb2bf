//! Indexer error types.

use std::path::PathBuf;
use thiserror::Error;

use cppcia_core::CoreError;

/// Errors that abort an indexing run.
///
/// Per-file adapter failures are not errors; they surface as
/// [`cppcia_core::ParseOutcome::Failed`].
#[derive(Debug, Error)]
pub enum IndexerError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration file
    #[error("invalid config {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Invalid exclusion glob
    #[error("invalid pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    /// Graph store rejected the batch
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Worker pool no longer accepts requests
    #[error("parser pool is shut down")]
    PoolShutDown,

    /// Blocking scan task failed to complete
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, IndexerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_is_transparent() {
        let err: IndexerError = CoreError::GraphInvariantViolation("dangling".into()).into();
        assert_eq!(err.to_string(), "graph invariant violated: dangling");
    }
}
