//! Common error types for the fragments client.

use thiserror::Error;

/// Top-level error type for fragment operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The local store could not be opened.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The local store is open but a read or write failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The remote API could not be reached.
    #[error("Remote unreachable: {0}")]
    RemoteUnreachable(String),

    /// The remote API answered with a non-success status.
    #[error("Remote rejected request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// No signed-in user is available for remote calls.
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The background sync task is not running.
    #[error("Sync error: {0}")]
    Sync(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors from the remote path. These degrade to local-only behavior.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::RemoteUnreachable(_)
                | Error::RemoteRejected { .. }
                | Error::Unauthenticated(_)
        )
    }

    /// Errors from the local store. These abort the operation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_) | Error::Storage(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
