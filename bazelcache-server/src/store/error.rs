use crate::core::CacheError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the backing object store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object under this key.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// Invalid store configuration.
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Reading the request body failed before the store saw all of it.
    #[error("request body error: {0}")]
    Body(#[source] std::io::Error),

    /// Writing to the store failed mid-upload.
    #[error("upload failed: {0}")]
    Upload(#[source] std::io::Error),

    /// Any other failure from the underlying object store.
    #[error("object store error: {0}")]
    Backend(#[source] object_store::Error),
}

impl StoreError {
    /// Map an object_store error for `key`, keeping not-found distinguishable.
    pub fn from_object_store(err: object_store::Error, key: &str) -> Self {
        match err {
            object_store::Error::NotFound { .. } => StoreError::NotFound {
                key: key.to_string(),
            },
            other => StoreError::Backend(other),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => CacheError::NotFound(key),
            StoreError::InvalidConfig(msg) => CacheError::Fatal(msg),
            other => CacheError::Transient(other.to_string()),
        }
    }
}
