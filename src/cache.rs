//! Resolution Cache
//!
//! Time- and capacity-bounded cache of resolutions keyed by
//! `(bucket, key_id)`. Entries are spread over independently locked LRU
//! shards so lookups for different keys do not serialize on one lock.
//! The capacity is global: nothing is evicted while the total entry count
//! is within it. Once a write pushes the total over, the least recently
//! used entry of the written shard goes (or of another shard when the
//! written one holds only the new entry).
//! Values are cloned out under the shard lock; a caller holding a
//! resolution is unaffected by later eviction.

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::resolver::{Resolution, ResolutionKey};

type Shard = Mutex<LruCache<ResolutionKey, Resolution>>;

/// Sharded LRU cache of resolutions
pub struct ResolutionCache {
    shards: Vec<Shard>,
    hasher: RandomState,
    capacity: usize,
    /// Entries across all shards, updated under the owning shard lock
    entries: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    evictions: AtomicU64,
}

/// Cache counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evictions: u64,
}

impl ResolutionCache {
    /// Create a cache holding up to `capacity` entries over `shards` locks.
    /// Zero values are raised to one.
    pub fn new(capacity: usize, shards: usize) -> Self {
        let capacity = capacity.max(1);
        let shard_count = shards.clamp(1, capacity);

        // Shards are bounded by the global count, not individually
        let shards = (0..shard_count)
            .map(|_| Mutex::new(LruCache::unbounded()))
            .collect();

        Self {
            shards,
            hasher: RandomState::new(),
            capacity,
            entries: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn shard_index(&self, key: &ResolutionKey) -> usize {
        (self.hasher.hash_one(key) as usize) % self.shards.len()
    }

    fn shard(&self, key: &ResolutionKey) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Look up a resolution that is still fresh at `now`.
    /// A stale entry is removed and reported as a miss.
    pub fn get(&self, key: &ResolutionKey, now: DateTime<Utc>) -> Option<Resolution> {
        let mut shard = self.shard(key).lock();

        match shard.get(key) {
            Some(resolution) if resolution.is_fresh(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(resolution.clone());
            }
            Some(_) => {}
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }

        if shard.pop(key).is_some() {
            self.entries.fetch_sub(1, Ordering::Relaxed);
        }
        drop(shard);

        self.expired.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(key = %key, "evicted stale resolution");
        None
    }

    /// Store a resolution, replacing any previous entry for the key
    pub fn put(&self, key: ResolutionKey, resolution: Resolution) {
        let idx = self.shard_index(&key);
        let mut shard = self.shards[idx].lock();

        if shard.put(key, resolution).is_some() {
            return;
        }

        let total = self.entries.fetch_add(1, Ordering::Relaxed) + 1;
        if total <= self.capacity {
            return;
        }

        if shard.len() > 1 {
            if let Some((evicted, _)) = shard.pop_lru() {
                self.record_eviction(&evicted);
            }
            return;
        }
        drop(shard);

        // The written shard holds only the new entry
        for (i, other) in self.shards.iter().enumerate() {
            if i == idx {
                continue;
            }
            if let Some((evicted, _)) = other.lock().pop_lru() {
                self.record_eviction(&evicted);
                return;
            }
        }
    }

    fn record_eviction(&self, evicted: &ResolutionKey) {
        self.entries.fetch_sub(1, Ordering::Relaxed);
        self.evictions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(key = %evicted, "evicted least recently used resolution");
    }

    /// Drop the entry for a key. Absent keys are ignored.
    pub fn invalidate(&self, key: &ResolutionKey) {
        if self.shard(key).lock().pop(key).is_some() {
            self.entries.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Drop every entry of a bucket regardless of key id.
    /// Returns the number of entries removed.
    pub fn invalidate_bucket(&self, bucket: &str) -> usize {
        let mut removed = 0;

        for shard in &self.shards {
            let mut shard = shard.lock();
            let keys: Vec<ResolutionKey> = shard
                .iter()
                .filter(|(k, _)| k.bucket == bucket)
                .map(|(k, _)| k.clone())
                .collect();

            for key in keys {
                if shard.pop(&key).is_some() {
                    self.entries.fetch_sub(1, Ordering::Relaxed);
                    removed += 1;
                }
            }
        }

        removed
    }

    /// Drop every entry
    pub fn clear(&self) {
        for shard in &self.shards {
            let mut shard = shard.lock();
            self.entries.fetch_sub(shard.len(), Ordering::Relaxed);
            shard.clear();
        }
    }

    /// Number of cached entries, fresh or not
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries held at once
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the cache counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
