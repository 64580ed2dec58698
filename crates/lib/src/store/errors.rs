//! Error types for keyed store operations.

use thiserror::Error;

/// Errors raised by [`KeyedStore`](super::KeyedStore) operations.
///
/// Removing an absent key is not an error; those operations return `None`
/// or `false` instead.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// An item with the same key is already stored
    #[error("Duplicate key in store: {key}")]
    DuplicateKey { key: String },

    /// Indexed lookup of a key that is not stored
    #[error("Key not found in store: {key}")]
    KeyNotFound { key: String },
}

impl StoreError {
    /// Check if this error indicates a key was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::KeyNotFound { .. })
    }

    /// Check if this error indicates a key collision
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }

    /// Get the offending key, rendered with `Debug`
    pub fn key(&self) -> &str {
        match self {
            StoreError::DuplicateKey { key } | StoreError::KeyNotFound { key } => key,
        }
    }

    pub(crate) fn duplicate(key: &impl std::fmt::Debug) -> Self {
        StoreError::DuplicateKey {
            key: format!("{key:?}"),
        }
    }

    pub(crate) fn not_found(key: &impl std::fmt::Debug) -> Self {
        StoreError::KeyNotFound {
            key: format!("{key:?}"),
        }
    }
}

impl From<StoreError> for crate::Error {
    fn from(err: StoreError) -> Self {
        crate::Error::Store(err)
    }
}
