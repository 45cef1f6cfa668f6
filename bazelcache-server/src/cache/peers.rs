//! Peer routing table
//!
//! The table is an immutable [`PeerSnapshot`] swapped whole under a lock, so
//! a routing decision sees either the old set or the new one, never a mix.

use super::ring::{DEFAULT_REPLICAS, HashRing};
use crate::membership::{Peer, PeerSet, PeerUpdate};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// One published peer set and the ring built from it
#[derive(Debug, Default)]
pub struct PeerSnapshot {
    pub epoch: u64,
    pub peers: PeerSet,
    ring: HashRing,
}

impl PeerSnapshot {
    fn new(epoch: u64, peers: PeerSet) -> Self {
        let ring = HashRing::new(DEFAULT_REPLICAS, peers.iter());
        Self { epoch, peers, ring }
    }

    /// Owner of `key` under this snapshot
    pub fn owner(&self, key: &str) -> Option<&Peer> {
        self.ring.get(key)
    }
}

pub struct PeerPool {
    self_peer: Peer,
    snapshot: RwLock<Arc<PeerSnapshot>>,
}

impl PeerPool {
    /// Empty pool: every key is owned locally until peers are published.
    pub fn new(self_peer: Peer) -> Self {
        Self {
            self_peer,
            snapshot: RwLock::new(Arc::new(PeerSnapshot::default())),
        }
    }

    pub fn self_peer(&self) -> &Peer {
        &self.self_peer
    }

    /// Current routing snapshot
    pub fn snapshot(&self) -> Arc<PeerSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Replace the routing table. Updates whose epoch is not newer than the
    /// applied one are dropped.
    pub fn set_peers(&self, update: PeerUpdate) -> bool {
        let next = Arc::new(PeerSnapshot::new(update.epoch, update.peers));

        let mut current = self.snapshot.write();
        if next.epoch <= current.epoch {
            debug!(
                epoch = next.epoch,
                applied = current.epoch,
                "Ignoring stale peer update"
            );
            return false;
        }

        info!(
            epoch = next.epoch,
            peers = next.peers.len(),
            "Peer routing table updated"
        );
        *current = next;
        true
    }

    /// Remote peer that owns `key`; `None` when the key is ours.
    pub fn pick_peer(&self, key: &str) -> Option<Peer> {
        let snapshot = self.snapshot();
        match snapshot.owner(key) {
            Some(owner) if *owner != self.self_peer => Some(owner.clone()),
            _ => None,
        }
    }
}
