//! Error taxonomy for remote operations.
//!
//! Failures fall into two classes the sync core treats differently:
//! transient connection failures (timeouts, refused connections, HTTP
//! errors) pause syncing until the connection supervisor reprobes, while
//! everything else propagates to the caller unchanged.

use thiserror::Error;

/// Error returned by [`crate::RemoteClient`] operations.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote endpoint could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The remote answered with an error status.
    #[error("http error: status {status}")]
    Http { status: u16 },

    /// The remote rejected the request for a non-transport reason.
    #[error("remote api error: {0}")]
    Api(String),

    /// Local filesystem failure while preparing or applying a transfer.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Whether this error is a transient connection failure.
    ///
    /// Connection-class errors abandon the current batch or poll and are
    /// recovered from only via the connection supervisor reprobing. All
    /// other errors propagate.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            RemoteError::Connection(_) | RemoteError::Timeout | RemoteError::Http { .. }
        )
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if let Some(status) = err.status() {
            RemoteError::Http {
                status: status.as_u16(),
            }
        } else if err.is_connect() {
            RemoteError::Connection(err.to_string())
        } else {
            RemoteError::Api(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
