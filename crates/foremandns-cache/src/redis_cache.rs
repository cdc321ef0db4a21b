//! Redis cache backend
//!
//! Expiry is left to Redis: every `put` is a `SET .. EX ttl`, and there is no
//! local bookkeeping or sweep. The connection is opened lazily on first use
//! and reconnects on its own, so an unreachable server at startup only shows
//! up as failed lookups.
//!
//! Every operation, connecting included, is bounded by `timeout`. A server
//! that accepts connections but never answers costs each query at most that
//! long before it falls through to the inventory.

use super::{Cache, CacheError, CacheKind, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

/// Default bound on a single Redis round trip
pub const DEFAULT_REDIS_TIMEOUT: Duration = Duration::from_millis(500);

/// Redis connection settings
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// `host:port` of the Redis server
    pub server: String,
    pub password: Option<String>,
    pub db: i64,
    /// Upper bound on connecting plus one command
    pub timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:6379".to_string(),
            password: None,
            db: 0,
            timeout: DEFAULT_REDIS_TIMEOUT,
        }
    }
}

impl RedisConfig {
    /// Build the `redis://` connection URL, percent-encoding the password.
    pub fn url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("redis://{}/{}", self.server, self.db))
            .map_err(|e| CacheError::Config(format!("invalid redis server {:?}: {}", self.server, e)))?;

        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| CacheError::Config("cannot set redis password".to_string()))?;
        }

        Ok(url)
    }
}

/// Cache backed by a remote Redis server
pub struct RedisCache {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    ttl: Duration,
    timeout: Duration,
}

impl RedisCache {
    pub fn new(config: &RedisConfig, ttl: Duration) -> Result<Self> {
        let client = redis::Client::open(config.url()?.as_str())?;
        debug!(server = %config.server, db = config.db, timeout_ms = config.timeout.as_millis() as u64, "Redis cache configured");

        Ok(Self {
            client,
            connection: OnceCell::new(),
            ttl,
            timeout: config.timeout.max(Duration::from_millis(1)),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let conn = self
            .connection
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(conn.clone())
    }

    /// Run `op` under the configured timeout. An abandoned connect leaves the
    /// cell empty, so the next call tries again.
    async fn bounded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let value: Option<String> = conn.get(key).await?;
            Ok(value)
        })
        .await
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let _: () = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(self.ttl_secs())
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    fn kind(&self) -> CacheKind {
        CacheKind::Redis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    type Commands = Arc<Mutex<Vec<Vec<String>>>>;

    /// Read one RESP array of bulk strings, `None` on EOF.
    async fn read_command<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<Option<Vec<String>>> {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let count: usize = line.trim_end().trim_start_matches('*').parse().unwrap();

        let mut parts = Vec::with_capacity(count);
        for _ in 0..count {
            line.clear();
            reader.read_line(&mut line).await?;
            let len: usize = line.trim_end().trim_start_matches('$').parse().unwrap();
            let mut buf = vec![0u8; len + 2];
            reader.read_exact(&mut buf).await?;
            buf.truncate(len);
            parts.push(String::from_utf8(buf).unwrap());
        }
        Ok(Some(parts))
    }

    /// Minimal Redis: records every command, keeps SET values for GET and
    /// answers anything else with +OK.
    async fn fake_redis() -> (SocketAddr, Commands) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let commands: Commands = Arc::default();
        let store: Arc<Mutex<HashMap<String, String>>> = Arc::default();

        let seen = commands.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let seen = seen.clone();
                let store = store.clone();
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut reader = BufReader::new(read);
                    while let Ok(Some(command)) = read_command(&mut reader).await {
                        seen.lock().unwrap().push(command.clone());
                        let reply = match command[0].to_uppercase().as_str() {
                            "GET" => match store.lock().unwrap().get(&command[1]) {
                                Some(value) => format!("${}\r\n{}\r\n", value.len(), value),
                                None => "$-1\r\n".to_string(),
                            },
                            "SET" => {
                                store.lock().unwrap().insert(command[1].clone(), command[2].clone());
                                "+OK\r\n".to_string()
                            }
                            _ => "+OK\r\n".to_string(),
                        };
                        if write.write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        (addr, commands)
    }

    fn config_for(addr: SocketAddr, timeout: Duration) -> RedisConfig {
        RedisConfig {
            server: addr.to_string(),
            timeout,
            ..RedisConfig::default()
        }
    }

    #[test]
    fn test_url_without_password() {
        let config = RedisConfig::default();
        assert_eq!(config.url().unwrap().as_str(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn test_url_with_password_and_db() {
        let config = RedisConfig {
            server: "cache.internal:6380".to_string(),
            password: Some("p@ss word".to_string()),
            db: 3,
            ..RedisConfig::default()
        };
        let url = config.url().unwrap();
        assert_eq!(url.host_str(), Some("cache.internal"));
        assert_eq!(url.port(), Some(6380));
        assert_eq!(url.path(), "/3");
        assert_eq!(url.password(), Some("p%40ss%20word"));
    }

    #[test]
    fn test_ttl_is_at_least_one_second() {
        let cache = RedisCache::new(&RedisConfig::default(), Duration::from_millis(10)).unwrap();
        assert_eq!(cache.ttl_secs(), 1);
        assert_eq!(cache.kind(), CacheKind::Redis);
    }

    #[tokio::test]
    async fn test_put_sends_ttl_with_every_set() {
        let (addr, commands) = fake_redis().await;
        let cache = RedisCache::new(&config_for(addr, Duration::from_secs(5)), Duration::from_secs(1800)).unwrap();

        assert_eq!(cache.get("vm1").await.unwrap(), None);
        cache.put("vm1", "10.0.0.5").await.unwrap();
        cache.put("vm1", "10.0.0.6").await.unwrap();
        assert_eq!(cache.get("vm1").await.unwrap().as_deref(), Some("10.0.0.6"));

        let sets: Vec<Vec<String>> = commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c[0].eq_ignore_ascii_case("SET"))
            .cloned()
            .collect();
        assert_eq!(
            sets,
            vec![
                vec!["SET", "vm1", "10.0.0.5", "EX", "1800"],
                vec!["SET", "vm1", "10.0.0.6", "EX", "1800"],
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        // Bind then drop to get a port nothing listens on
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let cache = RedisCache::new(&config_for(addr, Duration::from_millis(300)), Duration::from_secs(60)).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), cache.get("vm1")).await.unwrap();
        assert!(matches!(result, Err(CacheError::Remote(_)) | Err(CacheError::Timeout(_))));

        let result = tokio::time::timeout(Duration::from_secs(5), cache.put("vm1", "10.0.0.5")).await.unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let timeout = Duration::from_millis(200);
        let cache = RedisCache::new(&config_for(addr, timeout), Duration::from_secs(60)).unwrap();

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(5), cache.get("vm1")).await.unwrap();
        assert!(matches!(result, Err(CacheError::Timeout(t)) if t == timeout));

        let result = tokio::time::timeout(Duration::from_secs(5), cache.put("vm1", "10.0.0.5")).await.unwrap();
        assert!(matches!(result, Err(CacheError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
