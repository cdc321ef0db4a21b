//! Error types for the DNS listener

use std::net::SocketAddr;
use thiserror::Error;

/// Error type for DNS server operations
#[derive(Debug, Error)]
pub enum DnsError {
    /// Failed to bind the listening socket
    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Socket I/O error
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// DNS message encode/decode error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),
}

/// Result type for DNS operations
pub type Result<T> = std::result::Result<T, DnsError>;
