use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Classification of a cache failure, decided once at the collaborator boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The key is absent from the backing store.
    NotFound,
    /// The backend failed, a later attempt may succeed.
    Transient,
    /// The backend failed in a way retrying cannot fix.
    Fatal,
}

/// Main error type for cache reads and writes
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Backend unavailable: {0}")]
    Transient(String),

    #[error("Backend failure: {0}")]
    Fatal(String),
}

impl CacheError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Fatal(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Transient | ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Backend detail stays in the logs; clients only see the status.
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self.kind() {
            ErrorKind::NotFound => "not found",
            ErrorKind::Transient | ErrorKind::Fatal => "failed to retrieve key",
        };

        (status, body).into_response()
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
