use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Byte-accounted LRU cache
///
/// Entries are ordered by a monotonically increasing access tick; the
/// smallest tick is the least recently used entry. Capacity is enforced by
/// the owner (see `CacheGroup`), which decides which of its caches to shrink.
pub struct ByteLru {
    inner: Mutex<LruInner>,
}

struct LruInner {
    /// Cache data
    data: HashMap<String, CacheEntry>,

    /// LRU ordering (access tick -> key)
    order: BTreeMap<u64, String>,

    next_tick: u64,
    stats: CacheStats,
}

struct CacheEntry {
    value: Bytes,
    tick: u64,
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub bytes: u64,
    pub items: u64,
    pub gets: u64,
    pub hits: u64,
    pub evictions: u64,
}

impl ByteLru {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LruInner {
                data: HashMap::new(),
                order: BTreeMap::new(),
                next_tick: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Get value from cache, marking it most recently used
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.stats.gets += 1;

        let tick = inner.next_tick;
        let entry = inner.data.get_mut(key)?;
        inner.order.remove(&entry.tick);
        entry.tick = tick;
        inner.order.insert(tick, key.to_string());
        inner.next_tick += 1;
        inner.stats.hits += 1;

        Some(entry.value.clone())
    }

    /// Put value into cache, replacing any previous entry for the key
    pub fn add(&self, key: &str, value: Bytes) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let tick = inner.next_tick;
        inner.next_tick += 1;
        let size = entry_size(key, &value);

        if let Some(old) = inner.data.insert(
            key.to_string(),
            CacheEntry { value, tick },
        ) {
            inner.order.remove(&old.tick);
            inner.stats.bytes -= entry_size(key, &old.value);
            inner.stats.items -= 1;
        }

        inner.order.insert(tick, key.to_string());
        inner.stats.bytes += size;
        inner.stats.items += 1;
        debug!(key, size, "cache add");
    }

    /// Evict the least recently used entry, returning its size
    pub fn remove_oldest(&self) -> Option<u64> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let (_, key) = inner.order.pop_first()?;
        let entry = inner.data.remove(&key)?;
        let size = entry_size(&key, &entry.value);
        inner.stats.bytes -= size;
        inner.stats.items -= 1;
        inner.stats.evictions += 1;
        debug!(key = %key, size, "cache evict");
        Some(size)
    }

    /// Bytes currently held (keys and values)
    pub fn bytes(&self) -> u64 {
        self.inner.lock().stats.bytes
    }

    pub fn items(&self) -> u64 {
        self.inner.lock().stats.items
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }
}

impl Default for ByteLru {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_size(key: &str, value: &Bytes) -> u64 {
    (key.len() + value.len()) as u64
}
