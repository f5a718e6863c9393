//! Error types for keel-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from a config apply or report cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The apply request carried no overview, or the overview is malformed.
    #[error("invalid overview: {0}")]
    InvalidOverview(String),

    /// A declared file lies outside every allow-listed directory.
    #[error("file not in allowed directories: {path}")]
    DisallowedPath { path: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file on disk does not hash to the declared value after a write.
    #[error("file hash does not match for {path}: expected {expected}, found {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// A declared mode string could not be parsed.
    #[error("invalid permissions '{permissions}' for {path}")]
    InvalidPermissions { path: String, permissions: String },

    /// A remote call failed for a specific file.
    #[error("{operation} failed for {path}: {source}")]
    Remote {
        operation: &'static str,
        path: String,
        #[source]
        source: TransferError,
    },

    /// A remote call that is not tied to a single file failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The apply deadline passed before all files were processed.
    #[error("config apply timed out before {path} could be processed")]
    Timeout { path: String },

    /// The apply was cancelled before all files were processed.
    #[error("config apply cancelled before {path} could be processed")]
    Cancelled { path: String },
}

impl SyncError {
    /// Whether the failure happened before any file was touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidOverview(_) | SyncError::DisallowedPath { .. }
        )
    }
}

/// Errors from the remote file service boundary.
#[derive(Debug, Error)]
pub enum TransferError {
    /// No transport was configured. Never retried.
    #[error("file service client is not initialized")]
    NotInitialized,

    /// The service rejected the request with a non-retryable status.
    #[error("{operation} rejected: {status}")]
    Rejected {
        operation: &'static str,
        status: tonic::Status,
    },

    /// Transient failures persisted until the retry budget ran out.
    #[error("{operation} gave up after {attempts} attempt(s): {last}")]
    RetryExhausted {
        operation: &'static str,
        attempts: u32,
        last: tonic::Status,
    },

    /// The caller's deadline passed while the call was retrying.
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    /// The caller cancelled while the call was retrying.
    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    /// The transport could not be set up (bad URL, etc.).
    #[error("transport error: {0}")]
    Transport(String),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
