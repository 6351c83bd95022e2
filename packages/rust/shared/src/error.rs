//! Error types for grantsync.
//!
//! Library crates use [`GrantSyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Fatal vs. recoverable follows the run contract: [`Fetch`], [`Decode`] and
//! [`Storage`] unwind to the run boundary; [`Enrichment`] is contained per
//! record and surfaced through the error log instead.
//!
//! [`Fetch`]: GrantSyncError::Fetch
//! [`Decode`]: GrantSyncError::Decode
//! [`Storage`]: GrantSyncError::Storage
//! [`Enrichment`]: GrantSyncError::Enrichment

use std::path::PathBuf;

/// Top-level error type for all grantsync operations.
#[derive(Debug, thiserror::Error)]
pub enum GrantSyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Non-success response or transport failure on the primary listing API.
    /// Always fatal for the run: no partial snapshot is persisted.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Malformed response body (JSON decode, missing result/meta keys).
    #[error("decode error: {0}")]
    Decode(String),

    /// Failure resolving one record's secondary award data. Contained by the
    /// enricher; never propagates past a single record.
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// Storage layer error: run lock contention, CSV read/write failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad URL, cancelled run, empty result).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GrantSyncError>;

impl GrantSyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the run (as opposed to a single record).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Enrichment(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = GrantSyncError::config("missing listing URL");
        assert_eq!(err.to_string(), "config error: missing listing URL");

        let err = GrantSyncError::Fetch("HTTP 503".into());
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn enrichment_errors_are_not_fatal() {
        assert!(!GrantSyncError::Enrichment("timeout".into()).is_fatal());
        assert!(GrantSyncError::Fetch("HTTP 500".into()).is_fatal());
        assert!(GrantSyncError::Storage("lock held".into()).is_fatal());
    }
}
