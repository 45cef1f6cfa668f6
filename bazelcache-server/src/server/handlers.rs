use crate::cache::CacheGroup;
use crate::core::{CacheError, CacheKey, Namespace};
use crate::store::{BlobStore, ByteStream};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, error};

/// Application state shared across handlers
///
/// Both handles are owned by the process and safe for concurrent use;
/// handlers keep no state of their own between requests.
#[derive(Clone)]
pub struct AppState {
    /// Read path: cache tier backed by the store
    pub group: CacheGroup,
    /// Write path: straight to the store
    pub store: Arc<dyn BlobStore>,
}

/// GET/HEAD /ac/{key}
pub async fn ac_get(State(state): State<AppState>, Path(rest): Path<String>) -> Response {
    read_blob(&state, Namespace::Ac, &rest).await
}

/// GET/HEAD /cas/{key}
pub async fn cas_get(State(state): State<AppState>, Path(rest): Path<String>) -> Response {
    read_blob(&state, Namespace::Cas, &rest).await
}

/// PUT /ac/{key}
pub async fn ac_put(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    body: Body,
) -> Response {
    write_blob(&state, Namespace::Ac, &rest, body).await
}

/// PUT /cas/{key}
pub async fn cas_put(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    body: Body,
) -> Response {
    write_blob(&state, Namespace::Cas, &rest, body).await
}

/// Read path: serve the value through the cache tier.
async fn read_blob(state: &AppState, namespace: Namespace, rest: &str) -> Response {
    let Some(key) = CacheKey::new(namespace, rest) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match state.group.get(key.as_str()).await {
        // Value is fully materialized, so Content-Length is set up front
        Ok(value) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            value,
        )
            .into_response(),
        Err(e) => {
            log_read_error(&key, &e);
            e.into_response()
        }
    }
}

/// Write path: stream the body into the store, bypassing the cache tier.
///
/// Nothing is invalidated here. A cached entry for `key` is either absent
/// or already holds these bytes, which only holds while keys are immutable.
async fn write_blob(state: &AppState, namespace: Namespace, rest: &str, body: Body) -> Response {
    let Some(key) = CacheKey::new(namespace, rest) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let stream: ByteStream = body
        .into_data_stream()
        .map_err(std::io::Error::other)
        .boxed();

    match state.store.put(key.as_str(), stream).await {
        Ok(()) => {
            debug!(key = %key, "stored blob");
            StatusCode::OK.into_response()
        }
        Err(e) => {
            error!(key = %key, error = %e, "http put request failed");
            CacheError::from(e).into_response()
        }
    }
}

fn log_read_error(key: &CacheKey, err: &CacheError) {
    if err.is_not_found() {
        debug!(key = %key, "cache miss on absent key");
    } else {
        error!(key = %key, error = %err, "http get request failed");
    }
}
