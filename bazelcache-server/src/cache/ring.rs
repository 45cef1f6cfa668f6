//! Consistent Hash Ring - CRC32 with virtual replicas
//!
//! Each peer is placed on the ring `replicas` times at
//! `crc32("{i}{peer}")`. A key belongs to the first peer position at or
//! after `crc32(key)`, wrapping around at the end.

use crate::membership::Peer;
use std::collections::HashMap;

/// Virtual nodes per peer
pub const DEFAULT_REPLICAS: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct HashRing {
    /// Sorted ring positions
    positions: Vec<u32>,
    owners: HashMap<u32, Peer>,
}

impl HashRing {
    /// Build a ring over `peers`
    pub fn new<'a>(replicas: usize, peers: impl IntoIterator<Item = &'a Peer>) -> Self {
        let mut ring = Self {
            positions: Vec::new(),
            owners: HashMap::new(),
        };

        for peer in peers {
            for i in 0..replicas {
                let position = crc32fast::hash(format!("{}{}", i, peer).as_bytes());
                ring.positions.push(position);
                ring.owners.insert(position, peer.clone());
            }
        }
        ring.positions.sort_unstable();
        ring
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Peer owning `key`, or `None` for an empty ring
    pub fn get(&self, key: &str) -> Option<&Peer> {
        if self.positions.is_empty() {
            return None;
        }

        let hash = crc32fast::hash(key.as_bytes());
        let idx = self.positions.partition_point(|&p| p < hash);
        let position = self.positions[idx % self.positions.len()];
        self.owners.get(&position)
    }
}
