//! foremandns DNS: answers A queries for inventory-tracked hosts.
//!
//! hickory-server receives packets on a UDP socket ([`DnsServer`]) and hands
//! each request to the [`QueryHandler`]. A questions are resolved through the
//! [`Resolver`]: cache first, inventory on miss, cache populated on success.

pub mod error;
pub mod handler;
pub mod resolver;
pub mod server;

pub use error::{DnsError, Result};
pub use handler::{normalize, FailurePolicy, QueryHandler, Reply, ANSWER_TTL};
pub use resolver::{Resolution, Resolver};
pub use server::DnsServer;
