use super::handlers::{self, AppState};
use crate::cache::peer_router;
use axum::{Router, extract::DefaultBodyLimit, http::StatusCode, routing::get};
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Create the Axum router with all endpoints
///
/// GET routes answer HEAD as well, without a body.
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    let peers = peer_router(state.group.clone());

    Router::new()
        // Action cache
        .route("/ac/{*key}", get(handlers::ac_get).put(handlers::ac_put))
        // Content-addressable storage
        .route("/cas/{*key}", get(handlers::cas_get).put(handlers::cas_put))
        .with_state(state)
        // Peer protocol, served by the cache tier
        .merge(peers)
        // Blobs are streamed, so no body size cap
        .layer(DefaultBodyLimit::disable())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
}
