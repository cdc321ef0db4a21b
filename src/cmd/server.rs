//! `foremandns server` - start the DNS server

use crate::config::Settings;
use clap::Args;
use color_eyre::eyre::{Result, WrapErr};
use foremandns_cache::create_cache;
use foremandns_dns::{DnsServer, QueryHandler, Resolver};
use foremandns_inventory::{ForemanClient, ForemanConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Args, Debug, Default, Clone)]
pub struct ServerArgs {
    /// Config file path
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Server listen ip address (default 0.0.0.0)
    #[arg(short = 'i', long)]
    pub ip: Option<String>,

    /// Server listen port (default 53)
    #[arg(short = 't', long)]
    pub port: Option<u16>,

    /// Log level e.g. debug, info, warn & error
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Log file path (default stdout)
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Foreman base url e.g. https://foreman.example.com/
    #[arg(short = 'f', long)]
    pub url: Option<String>,

    /// Foreman username
    #[arg(short = 'u', long)]
    pub username: Option<String>,

    /// Foreman password
    #[arg(short = 'p', long)]
    pub password: Option<String>,

    /// DNS zone the hosts live under
    #[arg(short = 'z', long)]
    pub zone: Option<String>,

    /// Cache type e.g. memory, redis, memcache
    #[arg(long)]
    pub cache_type: Option<String>,

    /// Cache expiry in seconds (default 1800)
    #[arg(long)]
    pub ttl: Option<u64>,

    /// Foreman lookup deadline in seconds, 0 for none (default 10)
    #[arg(long)]
    pub inventory_timeout: Option<u64>,

    /// Reply to failed Foreman lookups with "empty" (default) or "servfail"
    #[arg(long)]
    pub failure_response: Option<String>,

    /// Skip TLS certificate verification towards Foreman
    #[arg(long)]
    pub insecure: bool,
}

pub async fn run(args: ServerArgs) -> Result<()> {
    let settings = Settings::load(&args).wrap_err("Can't read config")?;

    crate::logging::init(&settings.log_level, settings.log_file.as_deref());
    match &settings.source {
        Some(path) => info!(path = %path.display(), "Loaded config file"),
        None => debug!("No config file found, using flags and defaults"),
    }

    settings.validate()?;
    if settings.insecure {
        warn!("TLS certificate verification towards Foreman is disabled");
    }

    info!(addr = %settings.bind_addr, zone = %settings.zone, "Starting the server");

    let inventory = ForemanClient::new(ForemanConfig {
        base_url: settings.url.clone(),
        username: settings.username.clone(),
        password: settings.password.clone(),
        insecure: settings.insecure,
        timeout: settings.inventory_timeout,
    })
    .wrap_err("Failed to configure Foreman client")?;

    let cache = create_cache(&settings.cache).wrap_err("Failed to create cache backend")?;

    let resolver = Resolver::new(cache.clone(), Arc::new(inventory))
        .with_deadline(settings.inventory_timeout);
    let handler = QueryHandler::new(Arc::new(resolver), settings.zone.clone())
        .with_failure_policy(settings.failure_policy);

    let server = DnsServer::bind(settings.bind_addr, handler)
        .await
        .wrap_err("Failed to set udp listener")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                // Keep the sender alive so the server keeps running
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });

    server.run(shutdown_rx).await?;
    cache.shutdown();
    Ok(())
}
