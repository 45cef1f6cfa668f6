//! SRV record discovery (e.g. a Kubernetes headless service).
//!
//! Every target behind the record becomes a peer using the local
//! instance's URL scheme, so `_http._tcp.cache.svc` answering
//! `cache-0.cache.svc:8080` yields `http://cache-0.cache.svc:8080`.

use super::resolver::PeerResolver;
use super::types::{MembershipError, MembershipResult, Peer, PeerSet};
use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::rr::Name;
use tracing::{debug, warn};

pub struct SrvResolver {
    name: String,
    self_peer: Peer,
    resolver: TokioAsyncResolver,
}

impl SrvResolver {
    /// Fails fatally when the record name is malformed or the system
    /// resolver configuration cannot be read.
    pub fn new(name: &str, self_peer: Peer) -> MembershipResult<Self> {
        Name::from_utf8(name).map_err(|e| {
            MembershipError::Fatal(format!("invalid SRV record name {:?}: {}", name, e))
        })?;

        let resolver = TokioAsyncResolver::tokio_from_system_conf().map_err(|e| {
            MembershipError::Fatal(format!("failed to load system DNS configuration: {}", e))
        })?;

        Ok(Self {
            name: name.to_string(),
            self_peer,
            resolver,
        })
    }
}

#[async_trait]
impl PeerResolver for SrvResolver {
    async fn resolve(&self) -> MembershipResult<PeerSet> {
        let lookup = self
            .resolver
            .srv_lookup(self.name.as_str())
            .await
            .map_err(|e| match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => {
                    MembershipError::Transient(format!("no SRV records for {}", self.name))
                }
                _ => MembershipError::Transient(format!(
                    "SRV lookup for {} failed: {}",
                    self.name, e
                )),
            })?;

        let targets = lookup
            .iter()
            .map(|srv| (srv.target().to_utf8(), srv.port()))
            .collect::<Vec<_>>();
        debug!(name = %self.name, targets = targets.len(), "resolved SRV record");

        Ok(peers_from_targets(&self.self_peer, targets))
    }
}

/// Turn SRV targets into a peer set that always includes `self_peer`.
///
/// Targets that do not form a valid URL are skipped.
pub fn peers_from_targets(
    self_peer: &Peer,
    targets: impl IntoIterator<Item = (String, u16)>,
) -> PeerSet {
    let scheme = self_peer.scheme();
    let peers = targets.into_iter().filter_map(|(target, port)| {
        let host = target.trim_end_matches('.');
        match Peer::from_endpoint(scheme, host, port) {
            Ok(peer) => Some(peer),
            Err(e) => {
                warn!(target = %target, port, error = %e, "Skipping SRV target");
                None
            }
        }
    });

    PeerSet::with_self(self_peer, peers)
}
