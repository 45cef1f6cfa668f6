//! Distributed Cache Tier
//!
//! In-process cache shared across the fleet:
//! - Main cache for keys this instance owns, hot cache for popular remote keys
//! - Consistent hashing to find each key's owner
//! - One backing-store load per key at a time (request coalescing)
//! - HTTP peer protocol for fetching from the owner

pub mod flight;
pub mod group;
pub mod http;
pub mod lru;
pub mod peers;
pub mod ring;

pub use flight::SingleFlight;
pub use group::{CacheGroup, CacheType, GroupConfig, GroupStatsSnapshot};
pub use http::{PEER_BASE_PATH, PeerClient, peer_router};
pub use lru::{ByteLru, CacheStats};
pub use peers::{PeerPool, PeerSnapshot};
pub use ring::{DEFAULT_REPLICAS, HashRing};
