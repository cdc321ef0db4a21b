//! Inventory lookups for foremandns
//!
//! The resolver only needs one question answered: "what is the IPv4 address
//! of host X?". [`InventoryLookup`] is that contract, and [`ForemanClient`]
//! answers it from the Foreman hosts API.

pub mod error;
pub mod foreman;

pub use error::{InventoryError, Result};
pub use foreman::{ForemanClient, ForemanConfig};

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Host-to-address lookup against the system of record.
///
/// `Ok(Some(ip))` means found, `Ok(None)` means the inventory has no address
/// for the host, `Err` means the lookup itself failed.
#[async_trait]
pub trait InventoryLookup: Send + Sync {
    async fn lookup(&self, name: &str) -> Result<Option<Ipv4Addr>>;
}
