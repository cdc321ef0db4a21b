// foremandns: DNS server for hosts managed by Foreman
use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;

mod cmd;
mod config;
mod logging;

use cmd::server::ServerArgs;

#[derive(Parser, Debug)]
#[command(
    name = "foremandns",
    author,
    version,
    about = "foremandns is a simple DNS server for Foreman hosts",
    long_about = "A DNS server that answers A queries for hosts registered in Foreman,\n\
                  caching addresses in memory, Redis or a size-bounded LRU."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the DNS server
    Server(ServerArgs),
    /// Print the version number of foremandns
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => cmd::server::run(args).await?,
        Commands::Version => cmd::version::run(),
    }

    Ok(())
}
