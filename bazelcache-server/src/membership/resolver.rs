//! Peer resolution strategies.

use super::srv::SrvResolver;
use super::types::{MembershipResult, Peer, PeerSet};
use crate::config::PeerSource;
use async_trait::async_trait;
use std::sync::Arc;

/// Source of the authoritative peer set
#[async_trait]
pub trait PeerResolver: Send + Sync {
    /// Produce the complete current peer set, self included.
    async fn resolve(&self) -> MembershipResult<PeerSet>;

    /// Whether the set can change and should be polled.
    fn is_dynamic(&self) -> bool {
        true
    }
}

/// Fixed peer list for the lifetime of the process
pub struct StaticResolver {
    peers: PeerSet,
}

impl StaticResolver {
    pub fn new(self_peer: &Peer, peers: impl IntoIterator<Item = Peer>) -> Self {
        Self {
            peers: PeerSet::with_self(self_peer, peers),
        }
    }
}

#[async_trait]
impl PeerResolver for StaticResolver {
    async fn resolve(&self) -> MembershipResult<PeerSet> {
        Ok(self.peers.clone())
    }

    fn is_dynamic(&self) -> bool {
        false
    }
}

/// Build the resolver for a validated peer source.
pub fn resolver_for(
    source: &PeerSource,
    self_peer: &Peer,
) -> MembershipResult<Arc<dyn PeerResolver>> {
    let resolver: Arc<dyn PeerResolver> = match source {
        PeerSource::Standalone => Arc::new(StaticResolver::new(self_peer, std::iter::empty())),
        PeerSource::Static(peers) => {
            Arc::new(StaticResolver::new(self_peer, peers.iter().cloned()))
        }
        PeerSource::Srv(name) => Arc::new(SrvResolver::new(name, self_peer.clone())?),
    };
    Ok(resolver)
}
