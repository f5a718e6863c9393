use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime, bus and plugins.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("config error: {0}")]
    Config(#[from] keel_core::ConfigError),

    #[error("sync error: {0}")]
    Sync(#[from] keel_sync::SyncError),

    #[error("transfer error: {0}")]
    Transfer(#[from] keel_sync::TransferError),

    #[error("daemon runtime error: {0}")]
    Runtime(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
