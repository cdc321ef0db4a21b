//! Cache-then-inventory name resolution
//!
//! A cache hit is final: the inventory is never consulted for a name the
//! cache can answer. On a miss the inventory is asked exactly once, and a
//! found address is written back to the cache. Cache failures degrade to a
//! miss; inventory failures become [`Resolution::Failed`].

use foremandns_cache::Cache;
use foremandns_inventory::InventoryLookup;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Outcome of resolving one name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Answered from the cache
    Cached(Ipv4Addr),
    /// Answered by the inventory and cached
    Resolved(Ipv4Addr),
    /// The inventory has no address for this name
    NotFound,
    /// The inventory lookup failed or timed out
    Failed(String),
}

impl Resolution {
    pub fn ip(&self) -> Option<Ipv4Addr> {
        match self {
            Self::Cached(ip) | Self::Resolved(ip) => Some(*ip),
            Self::NotFound | Self::Failed(_) => None,
        }
    }
}

/// Resolves host names through a cache backed by the inventory
pub struct Resolver {
    cache: Arc<dyn Cache>,
    inventory: Arc<dyn InventoryLookup>,
    /// Upper bound on a single inventory lookup
    deadline: Option<Duration>,
}

impl Resolver {
    pub fn new(cache: Arc<dyn Cache>, inventory: Arc<dyn InventoryLookup>) -> Self {
        Self {
            cache,
            inventory,
            deadline: None,
        }
    }

    /// Bound each inventory lookup; `None` lets it run to completion.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline.filter(|d| !d.is_zero());
        self
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Resolve a normalized host name (zone suffix already stripped).
    pub async fn lookup(&self, domain: &str) -> Resolution {
        match self.cache.get(domain).await {
            Ok(Some(value)) => match value.parse::<Ipv4Addr>() {
                Ok(ip) => {
                    debug!(domain = %domain, ip = %ip, "Cache hit");
                    return Resolution::Cached(ip);
                }
                Err(_) => {
                    warn!(domain = %domain, value = %value, "Ignoring non-IPv4 cache value");
                }
            },
            Ok(None) => debug!(domain = %domain, "Cache miss"),
            Err(e) => {
                warn!(domain = %domain, backend = %self.cache.kind(), error = %e, "Cache lookup failed, treating as miss");
            }
        }

        let result = match self.deadline {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.inventory.lookup(domain)).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err(format!(
                        "inventory lookup timed out after {}ms",
                        deadline.as_millis()
                    )),
                }
            }
            None => self.inventory.lookup(domain).await.map_err(|e| e.to_string()),
        };

        match result {
            Ok(Some(ip)) => {
                debug!(domain = %domain, ip = %ip, "Resolved from inventory");
                if let Err(e) = self.cache.put(domain, &ip.to_string()).await {
                    warn!(domain = %domain, backend = %self.cache.kind(), error = %e, "Failed to cache address");
                }
                Resolution::Resolved(ip)
            }
            Ok(None) => {
                debug!(domain = %domain, "Host has no address in inventory");
                Resolution::NotFound
            }
            Err(reason) => {
                error!(domain = %domain, error = %reason, "Inventory lookup failed");
                Resolution::Failed(reason)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use foremandns_cache::{CacheError, CacheKind, MemoryCache, RedisCache, RedisConfig};
    use foremandns_inventory::InventoryError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// What the mock inventory answers with
    #[derive(Clone)]
    pub(crate) enum Answer {
        Found(Ipv4Addr),
        Missing,
        Fail,
        Hang,
    }

    /// Inventory stub that counts how often it is asked
    pub(crate) struct MockInventory {
        answer: Answer,
        calls: AtomicUsize,
    }

    impl MockInventory {
        pub(crate) fn new(answer: Answer) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InventoryLookup for MockInventory {
        async fn lookup(&self, name: &str) -> foremandns_inventory::Result<Option<Ipv4Addr>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.answer {
                Answer::Found(ip) => Ok(Some(*ip)),
                Answer::Missing => Ok(None),
                Answer::Fail => Err(InventoryError::Status {
                    name: name.to_string(),
                    status: 503,
                }),
                Answer::Hang => std::future::pending().await,
            }
        }
    }

    /// Cache whose backend is always down
    struct BrokenCache;

    #[async_trait]
    impl Cache for BrokenCache {
        async fn get(&self, _key: &str) -> foremandns_cache::Result<Option<String>> {
            Err(CacheError::Poisoned("backend down".to_string()))
        }

        async fn put(&self, _key: &str, _value: &str) -> foremandns_cache::Result<()> {
            Err(CacheError::Poisoned("backend down".to_string()))
        }

        fn kind(&self) -> CacheKind {
            CacheKind::Redis
        }
    }

    fn memory_cache() -> Arc<dyn Cache> {
        Arc::new(MemoryCache::new(Duration::from_secs(1800)))
    }

    const IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

    #[tokio::test]
    async fn test_cache_hit_skips_inventory() {
        let cache = memory_cache();
        cache.put("vm1", "10.0.0.9").await.unwrap();
        let inventory = MockInventory::new(Answer::Found(IP));
        let resolver = Resolver::new(cache, inventory.clone());

        let resolution = resolver.lookup("vm1").await;

        assert_eq!(resolution, Resolution::Cached(Ipv4Addr::new(10, 0, 0, 9)));
        assert_eq!(inventory.calls(), 0);
    }

    #[tokio::test]
    async fn test_miss_queries_inventory_and_populates_cache() {
        let cache = memory_cache();
        let inventory = MockInventory::new(Answer::Found(IP));
        let resolver = Resolver::new(cache.clone(), inventory.clone());

        assert_eq!(resolver.lookup("vm1").await, Resolution::Resolved(IP));
        assert_eq!(cache.get("vm1").await.unwrap().as_deref(), Some("10.0.0.5"));

        assert_eq!(resolver.lookup("vm1").await, Resolution::Cached(IP));
        assert_eq!(inventory.calls(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let cache = memory_cache();
        let inventory = MockInventory::new(Answer::Missing);
        let resolver = Resolver::new(cache.clone(), inventory.clone());

        assert_eq!(resolver.lookup("ghost").await, Resolution::NotFound);
        assert_eq!(resolver.lookup("ghost").await, Resolution::NotFound);
        assert_eq!(cache.get("ghost").await.unwrap(), None);
        assert_eq!(inventory.calls(), 2);
    }

    #[tokio::test]
    async fn test_inventory_failure_is_reported() {
        let cache = memory_cache();
        let inventory = MockInventory::new(Answer::Fail);
        let resolver = Resolver::new(cache.clone(), inventory.clone());

        let resolution = resolver.lookup("vm1").await;

        assert!(matches!(resolution, Resolution::Failed(ref reason) if reason.contains("503")));
        assert_eq!(resolution.ip(), None);
        assert_eq!(cache.get("vm1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cache_errors_degrade_to_miss() {
        let inventory = MockInventory::new(Answer::Found(IP));
        let resolver = Resolver::new(Arc::new(BrokenCache), inventory.clone());

        assert_eq!(resolver.lookup("vm1").await, Resolution::Resolved(IP));
        assert_eq!(inventory.calls(), 1);
    }

    #[tokio::test]
    async fn test_garbage_cache_value_falls_through() {
        let cache = memory_cache();
        cache.put("vm1", "not-an-ip").await.unwrap();
        let inventory = MockInventory::new(Answer::Found(IP));
        let resolver = Resolver::new(cache.clone(), inventory.clone());

        assert_eq!(resolver.lookup("vm1").await, Resolution::Resolved(IP));
        assert_eq!(cache.get("vm1").await.unwrap().as_deref(), Some("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_unresponsive_redis_falls_through_to_inventory() {
        // Accepts connections, never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let config = RedisConfig {
            server: addr.to_string(),
            timeout: Duration::from_millis(200),
            ..RedisConfig::default()
        };
        let cache: Arc<dyn Cache> = Arc::new(RedisCache::new(&config, Duration::from_secs(1800)).unwrap());
        let inventory = MockInventory::new(Answer::Found(IP));
        let resolver = Resolver::new(cache, inventory.clone()).with_deadline(Some(Duration::from_secs(1)));

        let resolution = tokio::time::timeout(Duration::from_secs(5), resolver.lookup("vm1"))
            .await
            .expect("lookup must not hang on the cache");

        assert_eq!(resolution, Resolution::Resolved(IP));
        assert_eq!(inventory.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_inventory_call() {
        let inventory = MockInventory::new(Answer::Hang);
        let resolver = Resolver::new(memory_cache(), inventory.clone())
            .with_deadline(Some(Duration::from_secs(5)));

        let resolution = resolver.lookup("slow").await;

        assert!(matches!(resolution, Resolution::Failed(ref reason) if reason.contains("timed out")));
        assert_eq!(inventory.calls(), 1);
    }

    #[test]
    fn test_zero_deadline_disables_timeout() {
        let resolver = Resolver::new(memory_cache(), MockInventory::new(Answer::Missing))
            .with_deadline(Some(Duration::ZERO));
        assert_eq!(resolver.deadline, None);
    }
}
