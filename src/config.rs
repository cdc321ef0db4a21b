//! Server configuration
//!
//! Settings come from three layers, highest precedence first: command-line
//! flags, the YAML config file, built-in defaults. The config file is either
//! the one named by `--config` or the first of [`SEARCH_PATHS`] that exists.

use crate::cmd::server::ServerArgs;
use foremandns_cache::{BoundedConfig, CacheConfig, CacheKind, RedisConfig};
use foremandns_dns::FailurePolicy;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file locations tried when `--config` is not given
pub const SEARCH_PATHS: &[&str] = &[
    "/etc/foremandns/foremandns.yaml",
    "~/.foremandns/foremandns.yaml",
    "./foremandns.yaml",
];

const DEFAULT_IP: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 53;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_INVENTORY_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Foreman {0} cannot be empty. Please run with --{0} or add {0} in the foremandns.yaml config")]
    Missing(&'static str),

    #[error("invalid listen address {ip}:{port}")]
    InvalidAddress { ip: String, port: u16 },
}

/// Layout of `foremandns.yaml`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileConfig {
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub zone: Option<String>,
    pub cache_type: Option<String>,
    pub ttl: Option<u64>,
    pub log_level: Option<String>,
    pub log: Option<PathBuf>,
    pub inventory_timeout: Option<u64>,
    pub failure_response: Option<String>,
    pub insecure: Option<bool>,
    pub redis: RedisSection,
    pub bounded: BoundedSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RedisSection {
    pub server: Option<String>,
    pub password: Option<String>,
    pub db: Option<i64>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BoundedSection {
    pub capacity: Option<usize>,
    pub evict_batch: Option<usize>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        // An empty file is a valid, empty config
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved server settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub url: String,
    pub username: String,
    pub password: String,
    pub zone: String,
    pub cache: CacheConfig,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub inventory_timeout: Option<Duration>,
    pub failure_policy: FailurePolicy,
    pub insecure: bool,
    /// Config file the settings were read from, if any
    pub source: Option<PathBuf>,
}

impl Settings {
    /// Resolve settings from flags and the config file they point at.
    pub fn load(args: &ServerArgs) -> Result<Self, ConfigError> {
        let source = match &args.config {
            Some(path) => Some(path.clone()),
            None => find_config_file(),
        };

        let file = match &source {
            Some(path) => FileConfig::from_path(path)?,
            None => FileConfig::default(),
        };

        let mut settings = Self::merge(args, file)?;
        settings.source = source;
        Ok(settings)
    }

    /// Layer flags over file values over defaults.
    pub fn merge(args: &ServerArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let ip = args
            .ip
            .clone()
            .or(file.ip)
            .unwrap_or_else(|| DEFAULT_IP.to_string());
        let port = args.port.or(file.port).unwrap_or(DEFAULT_PORT);
        let bind_ip: IpAddr = ip
            .parse()
            .map_err(|_| ConfigError::InvalidAddress { ip: ip.clone(), port })?;

        let ttl = args
            .ttl
            .or(file.ttl)
            .map(Duration::from_secs)
            .unwrap_or(foremandns_cache::DEFAULT_TTL);

        let cache_type = args.cache_type.clone().or(file.cache_type).unwrap_or_default();

        let bounded_defaults = BoundedConfig::default();
        let redis_defaults = RedisConfig::default();
        let cache = CacheConfig {
            kind: CacheKind::from_str_loose(&cache_type),
            ttl,
            redis: RedisConfig {
                server: file.redis.server.unwrap_or(redis_defaults.server),
                password: file.redis.password.filter(|p| !p.is_empty()),
                db: file.redis.db.unwrap_or(redis_defaults.db),
                timeout: file
                    .redis
                    .timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(redis_defaults.timeout),
            },
            bounded: BoundedConfig {
                capacity: file.bounded.capacity.unwrap_or(bounded_defaults.capacity),
                evict_batch: file.bounded.evict_batch.unwrap_or(bounded_defaults.evict_batch),
            },
        };

        let inventory_timeout = args
            .inventory_timeout
            .or(file.inventory_timeout)
            .unwrap_or(DEFAULT_INVENTORY_TIMEOUT_SECS);

        Ok(Self {
            bind_addr: SocketAddr::new(bind_ip, port),
            url: args.url.clone().or(file.url).unwrap_or_default(),
            username: args.username.clone().or(file.username).unwrap_or_default(),
            password: args.password.clone().or(file.password).unwrap_or_default(),
            zone: args.zone.clone().or(file.zone).unwrap_or_default(),
            cache,
            log_level: args
                .log_level
                .clone()
                .or(file.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_file: args.log.clone().or(file.log),
            inventory_timeout: (inventory_timeout > 0).then(|| Duration::from_secs(inventory_timeout)),
            failure_policy: FailurePolicy::from_str_loose(
                args.failure_response.as_deref().or(file.failure_response.as_deref()).unwrap_or(""),
            ),
            insecure: args.insecure || file.insecure.unwrap_or(false),
            source: None,
        })
    }

    /// Check the settings the server cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Missing("url"));
        }
        if self.username.is_empty() {
            return Err(ConfigError::Missing("username"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing("password"));
        }
        Ok(())
    }
}

/// First existing file from [`SEARCH_PATHS`], with `~` expanded from `$HOME`.
fn find_config_file() -> Option<PathBuf> {
    SEARCH_PATHS
        .iter()
        .filter_map(|candidate| match candidate.strip_prefix("~/") {
            Some(rest) => std::env::var_os("HOME").map(|home| PathBuf::from(home).join(rest)),
            None => Some(PathBuf::from(candidate)),
        })
        .find(|path| path.is_file())
}
