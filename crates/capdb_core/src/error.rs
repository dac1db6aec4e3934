//! Error types for the capped store.

use capdb_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for capped store operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in capped store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The block was recycled by newer writes wrapping around the store
    /// while a reader was consuming it.
    #[error("block rolled over mid-read")]
    RolledOver,

    /// The store is closed.
    #[error("store is closed")]
    Closed,

    /// The configured capacity is unusable.
    #[error("invalid capacity: {message}")]
    InvalidCapacity {
        /// Description of the problem.
        message: String,
    },

    /// The backing store's header is not a capped store header.
    #[error("invalid store format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid capacity error.
    pub fn invalid_capacity(message: impl Into<String>) -> Self {
        Self::InvalidCapacity {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Returns true if `err` is a reader failure caused by the block being
    /// recycled mid-read.
    ///
    /// Callers should treat this like expiry (the data is gone), not like a
    /// disk fault.
    #[must_use]
    pub fn is_rollover(err: &io::Error) -> bool {
        matches!(
            err.get_ref().and_then(|e| e.downcast_ref::<CoreError>()),
            Some(CoreError::RolledOver)
        )
    }
}

impl From<CoreError> for io::Error {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(inner) => inner,
            CoreError::Storage(StorageError::Io(inner)) => inner,
            other => io::Error::other(other),
        }
    }
}
