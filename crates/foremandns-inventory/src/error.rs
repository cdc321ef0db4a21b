//! Error types for inventory lookups

use thiserror::Error;

/// Error type for inventory operations
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Missing required configuration
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    /// Base URL could not be parsed or used as a base
    #[error("invalid inventory URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Unexpected HTTP status
    #[error("inventory returned HTTP {status} for host {name}")]
    Status { name: String, status: u16 },

    /// Response body was not the expected JSON
    #[error("failed to decode host {name}: {reason}")]
    Decode { name: String, reason: String },

    /// Host record carries something that is not an IPv4 address
    #[error("host {name} has invalid IPv4 address {ip:?}")]
    InvalidAddress { name: String, ip: String },
}

/// Result type for inventory operations
pub type Result<T> = std::result::Result<T, InventoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InventoryError::MissingConfig("url");
        assert_eq!(err.to_string(), "missing required configuration: url");

        let err = InventoryError::Status {
            name: "vm1".to_string(),
            status: 502,
        };
        assert_eq!(err.to_string(), "inventory returned HTTP 502 for host vm1");

        let err = InventoryError::InvalidAddress {
            name: "vm1".to_string(),
            ip: "fe80::1".to_string(),
        };
        assert_eq!(err.to_string(), "host vm1 has invalid IPv4 address \"fe80::1\"");
    }
}
