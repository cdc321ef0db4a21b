//! Size-bounded cache backend
//!
//! Holds at most `capacity` entries. When a new key arrives at a full cache,
//! the `evict_batch` least recently used entries are dropped in one go. Every
//! entry also carries a fixed TTL from its last `put`; reads bump LRU order
//! but do not extend the TTL.

use super::{Cache, CacheError, CacheKind, Result};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Bounded cache configuration
#[derive(Debug, Clone)]
pub struct BoundedConfig {
    /// Maximum number of entries
    pub capacity: usize,
    /// Entries evicted at once when the cache is full
    pub evict_batch: usize,
}

impl Default for BoundedConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            evict_batch: 100,
        }
    }
}

struct BoundedEntry {
    value: String,
    expires_at: Instant,
}

/// LRU cache with a hard size limit
pub struct BoundedCache {
    entries: Mutex<LruCache<String, BoundedEntry>>,
    ttl: Duration,
    evict_batch: usize,
}

impl BoundedCache {
    pub fn new(config: &BoundedConfig, ttl: Duration) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.capacity)
            .ok_or_else(|| CacheError::Config("bounded cache capacity must be > 0".to_string()))?;

        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            evict_batch: config.evict_batch.clamp(1, config.capacity),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cap()
            .get()
    }
}

#[async_trait]
impl Cache for BoundedCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut guard = self.entries.lock().map_err(|e| {
            CacheError::Poisoned(e.to_string())
        })?;

        match guard.get(key) {
            None => return Ok(None),
            Some(entry) if Instant::now() < entry.expires_at => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => {}
        }

        // Expired
        guard.pop(key);
        Ok(None)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self.entries.lock().map_err(|e| {
            CacheError::Poisoned(e.to_string())
        })?;

        if !guard.contains(key) && guard.len() >= guard.cap().get() {
            let mut evicted = 0;
            while evicted < self.evict_batch && guard.pop_lru().is_some() {
                evicted += 1;
            }
            debug!(evicted, "Bounded cache full, evicted least recently used entries");
        }

        guard.put(
            key.to_string(),
            BoundedEntry {
                value: value.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    fn kind(&self) -> CacheKind {
        CacheKind::Bounded
    }
}
