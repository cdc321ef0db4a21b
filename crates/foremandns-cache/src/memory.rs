//! In-memory cache backend
//!
//! A single mutex guards the whole map. `get` and `put` both reset an entry's
//! last-touch time, and a background task sweeps the map once per second,
//! dropping entries idle for longer than the TTL. Hot entries therefore never
//! expire; an idle one is gone at most one sweep interval after its TTL.
//!
//! The sweep scans every entry while holding the lock. That is fine for host
//! inventories but will hurt fairness with very large key counts.

use super::{Cache, CacheError, CacheKind, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// How often the background task sweeps for expired entries
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Entry {
    value: String,
    last_touch: Instant,
}

type Entries = Arc<Mutex<HashMap<String, Entry>>>;

struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// In-memory backend with sliding expiry
pub struct MemoryCache {
    entries: Entries,
    ttl: Duration,
    sweeper: Mutex<Option<Sweeper>>,
}

impl MemoryCache {
    /// Create an empty cache. The sweep task is not running until [`start`](Self::start).
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            sweeper: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Spawn the periodic sweep task on the current Tokio runtime.
    ///
    /// Calling this while the task is already running is a no-op.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| CacheError::NoRuntime)?;

        let mut sweeper = lock(&self.sweeper)?;
        if sweeper.is_some() {
            return Ok(());
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let entries = Arc::clone(&self.entries);
        let ttl = self.ttl;

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match sweep_entries(&entries, ttl) {
                            Ok(0) => {}
                            Ok(evicted) => debug!(evicted, "Swept expired cache entries"),
                            Err(e) => warn!(error = %e, "Cache sweep failed"),
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            debug!("Cache sweep task stopped");
        });

        *sweeper = Some(Sweeper { shutdown, handle });
        debug!(ttl_secs = ttl.as_secs(), "Cache sweep task started");
        Ok(())
    }

    /// Stop the sweep task if it is running.
    pub fn stop(&self) {
        let sweeper = match self.sweeper.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(sweeper) = sweeper {
            let _ = sweeper.shutdown.send(true);
            sweeper.handle.abort();
        }
    }

    /// Whether the sweep task is running.
    pub fn is_running(&self) -> bool {
        lock(&self.sweeper)
            .map(|s| s.as_ref().is_some_and(|s| !s.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Run one sweep pass now, returning how many entries were evicted.
    pub fn sweep(&self) -> Result<usize> {
        sweep_entries(&self.entries, self.ttl)
    }

    /// Number of entries currently held, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut guard = lock(&self.entries)?;
        Ok(guard.get_mut(key).map(|entry| {
            entry.last_touch = Instant::now();
            entry.value.clone()
        }))
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = lock(&self.entries)?;
        let now = Instant::now();
        guard
            .entry(key.to_string())
            .and_modify(|entry| {
                entry.value = value.to_string();
                entry.last_touch = now;
            })
            .or_insert_with(|| Entry {
                value: value.to_string(),
                last_touch: now,
            });
        Ok(())
    }

    fn kind(&self) -> CacheKind {
        CacheKind::Memory
    }

    fn shutdown(&self) {
        self.stop();
    }
}

fn sweep_entries(entries: &Mutex<HashMap<String, Entry>>, ttl: Duration) -> Result<usize> {
    let mut guard = lock(entries)?;
    let now = Instant::now();
    let before = guard.len();
    guard.retain(|_, entry| now.duration_since(entry.last_touch) <= ttl);
    Ok(before - guard.len())
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| CacheError::Poisoned(e.to_string()))
}
