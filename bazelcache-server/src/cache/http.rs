//! Peer-to-peer cache protocol over HTTP
//!
//! `GET {peer}/_groupcache/{group}/{key}` answers with the raw value for a
//! key the receiving instance owns. The key travels as a single
//! percent-encoded path segment.

use super::group::CacheGroup;
use crate::core::{CacheError, Result};
use crate::membership::Peer;
use axum::{
    Router,
    extract::{Path, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::any,
};
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// Path prefix of the peer protocol
pub const PEER_BASE_PATH: &str = "_groupcache";

/// Client side of the peer protocol
#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
    group: String,
}

impl PeerClient {
    pub fn new(group: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Fatal(format!("failed to build peer client: {}", e)))?;

        Ok(Self {
            http,
            group: group.to_string(),
        })
    }

    /// URL under which `peer` serves `key`
    pub fn peer_url(&self, peer: &Peer, key: &str) -> Result<Url> {
        let mut url = Url::parse(peer.as_str())
            .map_err(|e| CacheError::Fatal(format!("invalid peer URL {}: {}", peer, e)))?;
        url.path_segments_mut()
            .map_err(|_| CacheError::Fatal(format!("peer URL {} cannot be a base", peer)))?
            .pop_if_empty()
            .push(PEER_BASE_PATH)
            .push(&self.group)
            .push(key);
        Ok(url)
    }

    /// Ask `peer` for `key`
    pub async fn fetch(&self, peer: &Peer, key: &str) -> Result<Bytes> {
        let url = self.peer_url(peer, key)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CacheError::Transient(format!("peer {} unreachable: {}", peer, e)))?;

        match response.status() {
            StatusCode::OK => response.bytes().await.map_err(|e| {
                CacheError::Transient(format!("reading response from peer {}: {}", peer, e))
            }),
            StatusCode::NOT_FOUND => Err(CacheError::NotFound(key.to_string())),
            status => Err(CacheError::Transient(format!(
                "peer {} answered {}",
                peer, status
            ))),
        }
    }
}

/// Router serving the peer protocol for `group`
pub fn peer_router(group: CacheGroup) -> Router {
    Router::new()
        .route(
            &format!("/{}/{{group}}/{{key}}", PEER_BASE_PATH),
            any(serve_peer),
        )
        .with_state(group)
}

async fn serve_peer(
    State(group): State<CacheGroup>,
    method: Method,
    Path((group_name, key)): Path<(String, String)>,
) -> Response {
    if method != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    if group_name != group.name() {
        return (StatusCode::NOT_FOUND, format!("no such group: {}", group_name)).into_response();
    }

    match group.get_local(&key).await {
        Ok(value) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            value,
        )
            .into_response(),
        Err(e) if e.is_not_found() => {
            debug!(key = %key, "peer request for absent key");
            e.into_response()
        }
        Err(e) => {
            error!(key = %key, error = %e, "peer request failed");
            e.into_response()
        }
    }
}
