//! Error types for the file store cache
//!
//! Provides unified error handling using thiserror.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the file store cache.
///
/// Note that a write dropped because the document would exceed its byte
/// budget is not an error: it is logged and counted in the stats instead.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Empty key, or a value that cannot be stored (e.g. serializes to `null`)
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The cross-process lock could not be taken within the configured ceiling
    #[error("Timed out after {waited:?} waiting for cache lock {}", path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    /// A lock token was released twice or handed to the wrong gate
    #[error("Invalid lock use: {0}")]
    InvalidLockUse(String),

    /// The document could not be read or replaced
    #[error("Failed to {operation} {}: {source}", path.display())]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The bytes on disk are not a valid cache document
    #[error("Corrupt cache document: {0}")]
    CorruptDocument(String),

    /// A class value could not be converted to or from JSON
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The cache options are unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error (e.g. a blocking worker panicked)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Builds an `Io` error for the given path and operation.
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            operation,
            source,
        }
    }

    /// Returns true for failures that may succeed if the caller retries later.
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::LockTimeout { .. })
    }
}

// == Result Type Alias ==
/// Convenience Result type for the file store cache.
pub type Result<T> = std::result::Result<T, CacheError>;
