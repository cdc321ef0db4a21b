//! UDP DNS server on top of hickory-server
//!
//! `ServerFuture` owns the receive loop and handles each request on its own
//! task, so a slow inventory lookup only stalls the query that triggered it.

use crate::error::{DnsError, Result};
use crate::handler::QueryHandler;
use hickory_server::ServerFuture;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::info;

/// The foremandns DNS server
pub struct DnsServer {
    server: ServerFuture<QueryHandler>,
    local_addr: SocketAddr,
    zone: String,
}

impl DnsServer {
    /// Bind the UDP socket and register it with the server.
    pub async fn bind(addr: SocketAddr, handler: QueryHandler) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| DnsError::BindFailed { addr, source })?;
        let local_addr = socket.local_addr()?;
        let zone = handler.zone().to_string();

        let mut server = ServerFuture::new(handler);
        server.register_socket(socket);

        Ok(Self {
            server,
            local_addr,
            zone,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve queries until `shutdown` flips to true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(addr = %self.local_addr, zone = %self.zone, "DNS server listening (UDP)");

        let finished = tokio::select! {
            result = self.server.block_until_done() => {
                result?;
                true
            }
            () = wait_for_shutdown(&mut shutdown) => false,
        };

        if !finished {
            self.server.shutdown_gracefully().await?;
        }

        info!("DNS server stopped");
        Ok(())
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
