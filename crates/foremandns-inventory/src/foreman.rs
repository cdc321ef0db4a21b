//! Foreman hosts API client
//!
//! Looks hosts up with `GET {base}/api/hosts/{name}` using HTTP basic auth.
//! A 404 or a host without an address is "not found"; everything else that
//! goes wrong is an error for the caller to log.

use crate::error::{InventoryError, Result};
use crate::InventoryLookup;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Connection settings for the Foreman API
#[derive(Debug, Clone)]
pub struct ForemanConfig {
    /// Base URL, e.g. `https://foreman.example.com/`
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Skip TLS certificate verification
    pub insecure: bool,
    /// Per-request timeout (None = no client-side timeout)
    pub timeout: Option<Duration>,
}

/// The subset of a Foreman host record we care about
#[derive(Debug, Deserialize)]
struct HostRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    ip: Option<String>,
}

/// Authenticated client for the Foreman hosts API
#[derive(Debug, Clone)]
pub struct ForemanClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
}

impl ForemanClient {
    pub fn new(config: ForemanConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(InventoryError::MissingConfig("url"));
        }
        if config.username.is_empty() {
            return Err(InventoryError::MissingConfig("username"));
        }
        if config.password.is_empty() {
            return Err(InventoryError::MissingConfig("password"));
        }

        let base_url = Url::parse(config.base_url.trim()).map_err(|e| InventoryError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InventoryError::InvalidUrl {
                url: config.base_url,
                reason: "not usable as a base URL".to_string(),
            });
        }

        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(config.insecure);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
            username: config.username,
            password: config.password,
        })
    }

    /// URL of the host resource for `name`, with the name percent-encoded.
    fn host_url(&self, name: &str) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["api", "hosts", name]);
        }
        url
    }
}

#[async_trait]
impl InventoryLookup for ForemanClient {
    async fn lookup(&self, name: &str) -> Result<Option<Ipv4Addr>> {
        let url = self.host_url(name);
        debug!(host = %name, url = %url, "Querying Foreman");

        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(host = %name, "Host not found in Foreman");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(InventoryError::Status {
                name: name.to_string(),
                status: status.as_u16(),
            });
        }

        let host: HostRecord = response.json().await.map_err(|e| InventoryError::Decode {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        debug!(host = %name, record_name = ?host.name, ip = ?host.ip, "Foreman host record");

        match host.ip.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(ip) => ip
                .parse::<Ipv4Addr>()
                .map(Some)
                .map_err(|_| InventoryError::InvalidAddress {
                    name: name.to_string(),
                    ip: ip.to_string(),
                }),
        }
    }
}
