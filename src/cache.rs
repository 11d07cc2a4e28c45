use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::metrics::{CACHE_HITS, CACHE_MISSES, CACHE_SIZE};

// Cache entry with timestamp
#[derive(Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) < self.ttl
    }
}

// Short-lived store for aggregate reads. Entries expire on read, never in the background.
pub struct EphemeralCache<V = serde_json::Value> {
    entries: DashMap<String, CacheEntry<V>>,
    // bumped by clear(); a value computed under an older generation is never stored
    generation: AtomicU64,
}

impl<V: Clone> Default for EphemeralCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> EphemeralCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        // remove_if takes the shard write lock, so a concurrent set() can't be lost
        let stale = self.entries.remove_if(key, |_, entry| !entry.is_fresh(now)).is_some();
        if stale {
            CACHE_SIZE.set(self.entries.len() as f64);
        }

        match self.entries.get(key) {
            Some(entry) if entry.is_fresh(now) => {
                CACHE_HITS.inc();
                Some(entry.value.clone())
            }
            _ => {
                CACHE_MISSES.inc();
                None
            }
        }
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
        CACHE_SIZE.set(self.entries.len() as f64);
    }

    // Read before computing a value, then store it with set_if_generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    // Stores the value unless clear() ran since `generation` was read.
    // The check happens under the key's shard lock, and clear() bumps the
    // generation before taking any shard, so a stale value can't slip in after it.
    pub fn set_if_generation(&self, key: impl Into<String>, value: V, ttl: Duration, generation: u64) -> bool {
        let entry = self.entries.entry(key.into());
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        entry.insert(CacheEntry {
            value,
            stored_at: Instant::now(),
            ttl,
        });
        CACHE_SIZE.set(self.entries.len() as f64);
        true
    }

    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
        CACHE_SIZE.set(0.0);
    }

    pub fn clear_key(&self, key: &str) {
        self.entries.remove(key);
        CACHE_SIZE.set(self.entries.len() as f64);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
