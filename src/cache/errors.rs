//! Cache Error Types
//!
//! Errors surfaced by the refresh engine and the snapshot store.

use crate::lister::ListError;

/// Refresh and persistence errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Listing failed: {0}")]
    List(#[from] ListError),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Refresh cancelled")]
    Cancelled,
}

impl CacheError {
    /// Whether the caller can carry on after this error
    ///
    /// Listing failures only abort the refresh they happened in. A failed
    /// save or a broken tree invariant leaves the cache in a state that must
    /// not be written over.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CacheError::List(_) | CacheError::NotFound(_) | CacheError::Cancelled
        )
    }

    pub(crate) fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        CacheError::Persistence(format!("{}: {}", context, err))
    }
}
