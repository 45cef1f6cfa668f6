//! Distributed cache group
//!
//! Read path for the cache tier:
//! 1. main cache (keys this instance owns), then hot cache (popular keys
//!    owned elsewhere),
//! 2. on a miss, one coalesced load per key: ask the owning peer, or load
//!    from the backing store when the key is ours or the peer failed.

use super::flight::SingleFlight;
use super::http::PeerClient;
use super::lru::{ByteLru, CacheStats};
use super::peers::PeerPool;
use crate::core::{CacheError, Result};
use crate::membership::{Peer, PeerSink, PeerUpdate};
use crate::store::BlobStore;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Cache group settings
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Group name, part of the peer protocol path
    pub name: String,
    /// Upper bound for main + hot cache bytes
    pub cache_bytes: u64,
    /// Timeout for a single peer fetch
    pub peer_timeout: Duration,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            name: "bazelcache".to_string(),
            cache_bytes: 2 << 32,
            peer_timeout: Duration::from_secs(30),
        }
    }
}

/// Which cache to read or populate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    /// Keys this instance owns
    Main,
    /// Keys owned by a peer but requested here often
    Hot,
}

/// Group counters
#[derive(Default)]
struct GroupStats {
    gets: AtomicU64,
    cache_hits: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
    loads: AtomicU64,
    loads_deduped: AtomicU64,
    local_loads: AtomicU64,
    local_load_errs: AtomicU64,
    server_requests: AtomicU64,
}

/// Point-in-time copy of the group counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupStatsSnapshot {
    /// Any get request, including from peers
    pub gets: u64,
    /// Served from main or hot cache
    pub cache_hits: u64,
    /// Remote loads that succeeded
    pub peer_loads: u64,
    /// Remote loads that failed and fell back to the store
    pub peer_errors: u64,
    /// gets - cache_hits
    pub loads: u64,
    /// Loads after coalescing
    pub loads_deduped: u64,
    /// Good loads from the backing store
    pub local_loads: u64,
    /// Failed loads from the backing store (not counting absent keys)
    pub local_load_errs: u64,
    /// Requests received from peers
    pub server_requests: u64,
    /// Coalesced loads running right now (gauge, not a counter)
    pub in_flight_loads: u64,
}

/// Cloneable handle to a cache group
#[derive(Clone)]
pub struct CacheGroup {
    inner: Arc<GroupInner>,
}

struct GroupInner {
    name: String,
    cache_bytes: u64,
    loader: Arc<dyn BlobStore>,
    pool: PeerPool,
    client: PeerClient,
    main_cache: ByteLru,
    hot_cache: ByteLru,
    flights: SingleFlight,
    local_flights: SingleFlight,
    stats: GroupStats,
}

impl CacheGroup {
    /// Create a group loading misses from `loader`. Until peers are
    /// published every key is treated as local.
    pub fn new(config: GroupConfig, self_peer: Peer, loader: Arc<dyn BlobStore>) -> Result<Self> {
        let client = PeerClient::new(&config.name, config.peer_timeout)?;

        Ok(Self {
            inner: Arc::new(GroupInner {
                name: config.name,
                cache_bytes: config.cache_bytes,
                loader,
                pool: PeerPool::new(self_peer),
                client,
                main_cache: ByteLru::new(),
                hot_cache: ByteLru::new(),
                flights: SingleFlight::new(),
                local_flights: SingleFlight::new(),
                stats: GroupStats::default(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn peers(&self) -> &PeerPool {
        &self.inner.pool
    }

    /// Get `key` through the cache tier, asking its owner on a miss.
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        self.inner.stats.gets.fetch_add(1, Ordering::Relaxed);
        if let Some(value) = self.inner.lookup_cache(key) {
            self.inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        self.inner.stats.loads.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let owned = key.to_string();
        self.inner
            .flights
            .run(key, async move { inner.load(&owned, true).await })
            .await
    }

    /// Get `key` on behalf of a peer. Never forwards to another peer, so
    /// instances with diverging peer sets cannot bounce a request around.
    pub async fn get_local(&self, key: &str) -> Result<Bytes> {
        self.inner.stats.server_requests.fetch_add(1, Ordering::Relaxed);
        self.inner.stats.gets.fetch_add(1, Ordering::Relaxed);
        if let Some(value) = self.inner.lookup_cache(key) {
            self.inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        self.inner.stats.loads.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let owned = key.to_string();
        self.inner
            .local_flights
            .run(key, async move { inner.load(&owned, false).await })
            .await
    }

    pub fn stats(&self) -> GroupStatsSnapshot {
        let s = &self.inner.stats;
        GroupStatsSnapshot {
            gets: s.gets.load(Ordering::Relaxed),
            cache_hits: s.cache_hits.load(Ordering::Relaxed),
            peer_loads: s.peer_loads.load(Ordering::Relaxed),
            peer_errors: s.peer_errors.load(Ordering::Relaxed),
            loads: s.loads.load(Ordering::Relaxed),
            loads_deduped: s.loads_deduped.load(Ordering::Relaxed),
            local_loads: s.local_loads.load(Ordering::Relaxed),
            local_load_errs: s.local_load_errs.load(Ordering::Relaxed),
            server_requests: s.server_requests.load(Ordering::Relaxed),
            in_flight_loads: (self.inner.flights.in_flight() + self.inner.local_flights.in_flight())
                as u64,
        }
    }

    pub fn cache_stats(&self, which: CacheType) -> CacheStats {
        self.inner.cache(which).stats()
    }
}

impl PeerSink for CacheGroup {
    fn set_peers(&self, update: PeerUpdate) -> bool {
        self.inner.pool.set_peers(update)
    }
}

impl GroupInner {
    fn cache(&self, which: CacheType) -> &ByteLru {
        match which {
            CacheType::Main => &self.main_cache,
            CacheType::Hot => &self.hot_cache,
        }
    }

    fn lookup_cache(&self, key: &str) -> Option<Bytes> {
        self.main_cache
            .get(key)
            .or_else(|| self.hot_cache.get(key))
    }

    async fn load(&self, key: &str, allow_peers: bool) -> Result<Bytes> {
        // A load for this key may have finished between our cache miss and
        // joining the flight.
        if let Some(value) = self.lookup_cache(key) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }
        self.stats.loads_deduped.fetch_add(1, Ordering::Relaxed);

        if allow_peers {
            if let Some(peer) = self.pool.pick_peer(key) {
                match self.client.fetch(&peer, key).await {
                    Ok(value) => {
                        self.stats.peer_loads.fetch_add(1, Ordering::Relaxed);
                        if rand::random_ratio(1, 10) {
                            self.populate(CacheType::Hot, key, value.clone());
                        }
                        return Ok(value);
                    }
                    Err(e) if e.is_not_found() => return Err(e),
                    Err(e) => {
                        self.stats.peer_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(key, peer = %peer, error = %e, "Peer load failed, loading locally");
                    }
                }
            }
        }

        match self.loader.get(key).await {
            Ok(value) => {
                self.stats.local_loads.fetch_add(1, Ordering::Relaxed);
                self.populate(CacheType::Main, key, value.clone());
                Ok(value)
            }
            Err(e) => {
                let err = CacheError::from(e);
                if !err.is_not_found() {
                    self.stats.local_load_errs.fetch_add(1, Ordering::Relaxed);
                }
                Err(err)
            }
        }
    }

    fn populate(&self, which: CacheType, key: &str, value: Bytes) {
        if self.cache_bytes == 0 {
            return;
        }
        self.cache(which).add(key, value);

        // Shrink until under budget, preferring the hot cache once it holds
        // more than an eighth of the main cache.
        loop {
            let main_bytes = self.main_cache.bytes();
            let hot_bytes = self.hot_cache.bytes();
            if main_bytes + hot_bytes <= self.cache_bytes {
                return;
            }

            let victim = if hot_bytes > main_bytes / 8 {
                &self.hot_cache
            } else {
                &self.main_cache
            };
            if victim.remove_oldest().is_none() {
                debug!("Nothing left to evict");
                return;
            }
        }
    }
}
