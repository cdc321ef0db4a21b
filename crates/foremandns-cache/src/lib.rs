//! Cache backends for foremandns
//!
//! This crate provides the `Cache` trait and three implementations:
//! - `MemoryCache` - In-process map with sliding expiry and a background sweep
//! - `RedisCache` - Remote key-value store, expiry delegated to Redis
//! - `BoundedCache` - Fixed-capacity LRU with per-entry TTL
//!
//! Exactly one backend is built at startup by [`create_cache`] and handed to
//! the resolver as an `Arc<dyn Cache>`.

mod bounded;
mod memory;
mod redis_cache;

pub use bounded::{BoundedCache, BoundedConfig};
pub use memory::{MemoryCache, SWEEP_INTERVAL};
pub use redis_cache::{RedisCache, RedisConfig};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Default cache TTL (30 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(1800);

/// Errors from cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("remote cache error: {0}")]
    Remote(#[from] redis::RedisError),

    #[error("remote cache did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("lock poisoned: {0}")]
    Poisoned(String),

    #[error("invalid cache configuration: {0}")]
    Config(String),

    #[error("no async runtime available to start the sweep task")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Name → IPv4 cache used by the resolver.
///
/// Values are IPv4 addresses in dotted form. A missing or expired key is
/// `Ok(None)`; callers cannot tell the two apart. Implementations must be safe
/// under concurrent `get`/`put` from many query tasks.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Look up a key, refreshing its expiry where the backend supports it.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a key with the configured TTL.
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Which backend this is.
    fn kind(&self) -> CacheKind;

    /// Stop any background work owned by the backend.
    fn shutdown(&self) {}
}

/// Which cache backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheKind {
    /// In-process map with sliding expiry
    #[default]
    Memory,

    /// Redis, expiry handled by the server
    Redis,

    /// Size-bounded LRU (selected by `memcache`, `memcached` or `bounded`)
    Bounded,
}

impl CacheKind {
    /// Parse a configured cache type. Unknown values fall back to `Memory`.
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "" | "memory" => Self::Memory,
            "redis" => Self::Redis,
            "memcache" | "memcached" | "bounded" => Self::Bounded,
            other => {
                warn!(cache_type = %other, "Unknown cache type, using in-memory cache");
                Self::Memory
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
            Self::Bounded => "bounded",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub kind: CacheKind,
    pub ttl: Duration,
    pub redis: RedisConfig,
    pub bounded: BoundedConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::Memory,
            ttl: DEFAULT_TTL,
            redis: RedisConfig::default(),
            bounded: BoundedConfig::default(),
        }
    }
}

/// Create the cache backend selected by configuration.
///
/// The in-memory backend has its sweep task started here, so this must run
/// inside a Tokio runtime.
pub fn create_cache(config: &CacheConfig) -> Result<Arc<dyn Cache>> {
    let cache: Arc<dyn Cache> = match config.kind {
        CacheKind::Memory => {
            let cache = MemoryCache::new(config.ttl);
            cache.start()?;
            Arc::new(cache)
        }
        CacheKind::Redis => Arc::new(RedisCache::new(&config.redis, config.ttl)?),
        CacheKind::Bounded => Arc::new(BoundedCache::new(&config.bounded, config.ttl)?),
    };

    info!(backend = %config.kind, ttl_secs = config.ttl.as_secs(), "Cache backend ready");
    Ok(cache)
}
