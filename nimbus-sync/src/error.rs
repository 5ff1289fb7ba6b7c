//! Sync-core error type.

use nimbus_core::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("config error: {0}")]
    Config(#[from] nimbus_core::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// Whether this error is a transient connection failure. Everything
    /// else propagates out of the workers for top-level logging.
    pub fn is_connection(&self) -> bool {
        matches!(self, SyncError::Remote(err) if err.is_connection())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
