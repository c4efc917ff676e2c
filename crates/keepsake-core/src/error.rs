//! Error taxonomy for the store and index layers.
//!
//! These errors stay inside the crate for the most part: the public store and
//! index APIs turn them into booleans, `None`, or empty results after logging.
//! Configuration loading is the exception and returns them directly.

use std::io;
use thiserror::Error;

/// Everything that can go wrong below the public store/index API.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record does not exist on disk.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The record id cannot be used as a file name.
    #[error("invalid record id: {0:?}")]
    InvalidId(String),

    /// Corrupt or incompatible JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another writer holds the lock (transient).
    #[error("lock contention: {0}")]
    LockContention(String),

    /// Disk or permission failure.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// The index could not be opened even after stale-lock cleanup.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    /// Any other index engine failure.
    #[error("index error: {0}")]
    Index(tantivy::TantivyError),

    /// `config.toml` could not be parsed.
    #[error("invalid configuration in {path}: {message}")]
    Config { path: String, message: String },
}

impl From<tantivy::TantivyError> for StoreError {
    fn from(err: tantivy::TantivyError) -> Self {
        if is_lock_busy(&err) {
            StoreError::LockContention(err.to_string())
        } else {
            StoreError::Index(err)
        }
    }
}

impl StoreError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::LockContention(_))
    }
}

/// Returns true when the engine refused a writer because another one is active.
pub(crate) fn is_lock_busy(err: &tantivy::TantivyError) -> bool {
    matches!(
        err,
        tantivy::TantivyError::LockFailure(tantivy::directory::error::LockError::LockBusy, _)
    )
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_busy_maps_to_contention() {
        let err = tantivy::TantivyError::LockFailure(
            tantivy::directory::error::LockError::LockBusy,
            Some("writer held".to_string()),
        );
        let store_err = StoreError::from(err);
        assert!(matches!(store_err, StoreError::LockContention(_)));
        assert!(store_err.is_transient());
    }

    #[test]
    fn other_engine_errors_are_not_transient() {
        let err = tantivy::TantivyError::InvalidArgument("bad".to_string());
        let store_err = StoreError::from(err);
        assert!(matches!(store_err, StoreError::Index(_)));
        assert!(!store_err.is_transient());
    }

    #[test]
    fn io_errors_convert() {
        let err: StoreError = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(err.to_string().contains("nope"));
    }
}
