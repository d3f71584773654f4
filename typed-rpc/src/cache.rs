//! Read-through cache keyed by explicit cache ids
//!
//! Values are stored as encoded envelopes, so a hit goes through the same
//! codec as a remote call and returns a [`RichValue`] equal to the one that
//! was loaded. Writers call [`EnvelopeCache::invalidate`] and await it before
//! they return.
//!
//! Every invalidation bumps an epoch. A load that started under an older
//! epoch returns its value to the caller but does not store it, so a read
//! racing a write cannot put stale data back after the write finished.

use crate::codec::{self, RichValue};
use crate::error::RpcResult;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

struct Entry {
    envelope: String,
    /// `None` when the TTL is too long to represent
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(envelope: String, ttl: Duration) -> Self {
        Self {
            envelope,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

struct Slots {
    entries: LruCache<String, Entry>,
    epoch: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

/// LRU cache of encoded envelopes with a TTL per entry.
#[derive(Clone)]
pub struct EnvelopeCache {
    slots: Arc<Mutex<Slots>>,
    counters: Arc<Counters>,
    capacity: NonZeroUsize,
}

impl std::fmt::Debug for EnvelopeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCache")
            .field("capacity", &self.capacity)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl EnvelopeCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                entries: LruCache::new(capacity),
                epoch: 0,
            })),
            counters: Arc::new(Counters::default()),
            capacity,
        }
    }

    /// Return the cached value for `id`, or run `loader` and cache its result
    /// for `ttl`.
    ///
    /// The lock is not held while the loader runs. Loader errors are returned
    /// unchanged and nothing is cached. A TTL too long to represent never
    /// expires.
    pub async fn get_or_load<F, Fut>(&self, id: &str, ttl: Duration, loader: F) -> RpcResult<RichValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RpcResult<RichValue>>,
    {
        let started = match self.lookup(id).await {
            Ok(value) => return Ok(value),
            Err(epoch) => epoch,
        };

        let value = loader().await?;
        let entry = Entry::new(codec::encode(&value), ttl);

        let mut slots = self.slots.lock().await;
        if slots.epoch != started {
            debug!(cache_id = %id, "Invalidated during load, not caching");
            return Ok(value);
        }
        slots.entries.put(id.to_string(), entry);
        trace!(cache_id = %id, ttl_ms = ttl.as_millis() as u64, "Cached value");
        Ok(value)
    }

    /// The cached value, or the epoch observed on a miss.
    async fn lookup(&self, id: &str) -> Result<RichValue, u64> {
        let mut slots = self.slots.lock().await;
        let epoch = slots.epoch;
        let Some(entry) = slots.entries.get(id) else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            trace!(cache_id = %id, "Cache miss");
            return Err(epoch);
        };

        if entry.is_expired() {
            slots.entries.pop(id);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            debug!(cache_id = %id, "Cache entry expired");
            return Err(epoch);
        }

        match codec::decode(&entry.envelope) {
            Ok(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                trace!(cache_id = %id, "Cache hit");
                Ok(value)
            }
            Err(error) => {
                warn!(cache_id = %id, error = %error, "Dropping undecodable cache entry");
                slots.entries.pop(id);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Err(epoch)
            }
        }
    }

    /// Remove the entry for `id`. Returns whether one existed.
    ///
    /// Loads already in flight will not store their result.
    pub async fn invalidate(&self, id: &str) -> bool {
        let removed = {
            let mut slots = self.slots.lock().await;
            slots.epoch += 1;
            slots.entries.pop(id).is_some()
        };
        if removed {
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!(cache_id = %id, "Cache entry invalidated");
        }
        removed
    }

    /// Remove every entry.
    pub async fn clear(&self) {
        let mut slots = self.slots.lock().await;
        slots.epoch += 1;
        let count = slots.entries.len() as u64;
        slots.entries.clear();
        self.counters.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.slots.lock().await.entries.len();
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entries,
            capacity: self.capacity.get(),
            hits,
            misses,
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently stored, expired ones included
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    /// Hit ratio (0.0 to 1.0)
    pub hit_ratio: f64,
}
