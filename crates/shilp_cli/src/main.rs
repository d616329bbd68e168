//! Shilp CLI
//!
//! Command-line client for a Shilp vector-search server.
//!
//! # Commands
//!
//! - `health` - Check server liveness and version
//! - `collections` - Manage collections and records
//! - `data` - Search, ingest, and browse storage
//! - `oplog` - Inspect the oplog and manage replicas
//! - `discovery` - Talk to the discovery control plane

mod commands;

use clap::{Args, Parser, Subcommand};
use commands::collections::CollectionsCommand;
use commands::data::DataCommand;
use commands::discovery::DiscoveryCommand;
use commands::oplog::OplogCommand;
use commands::Format;
use shilp_client::{ClientConfig, DiscoveryClient, ShilpClient, UnregisterRoute};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Shilp command-line client.
#[derive(Parser)]
#[command(name = "shilp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    globals: Globals,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command.
#[derive(Args)]
struct Globals {
    /// Server base URL
    #[arg(global = true, long, env = "SHILP_URL", default_value = "http://localhost:3000")]
    url: String,

    /// Request timeout in seconds
    #[arg(global = true, long, default_value = "30")]
    timeout_secs: u64,

    /// Send unregister calls to the dedicated unregister path
    #[arg(global = true, long)]
    dedicated_unregister: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server liveness and version
    Health,

    /// Manage collections and records
    Collections {
        #[command(subcommand)]
        command: CollectionsCommand,
    },

    /// Search, ingest, and browse storage
    Data {
        #[command(subcommand)]
        command: DataCommand,
    },

    /// Inspect the oplog and manage replicas
    Oplog {
        #[command(subcommand)]
        command: OplogCommand,
    },

    /// Talk to the discovery service
    Discovery {
        /// Discovery service URL
        #[arg(long, env = "SHILP_DISCOVERY_URL")]
        discovery_url: String,

        /// Account ID
        #[arg(long, env = "SHILP_ACCOUNT_ID")]
        account_id: String,

        #[command(subcommand)]
        command: DiscoveryCommand,
    },

    /// Show version information
    Version,
}

impl Globals {
    fn config(&self, base_url: &str) -> ClientConfig {
        let route = if self.dedicated_unregister {
            UnregisterRoute::Dedicated
        } else {
            UnregisterRoute::SharedRegisterPath
        };
        ClientConfig::new(base_url)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_unregister_route(route)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.globals.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let globals = &cli.globals;
    let format = globals.format;
    let client = ShilpClient::with_config(globals.config(&globals.url))?;

    match cli.command {
        Commands::Health => commands::health::run(&client, format).await?,
        Commands::Collections { command } => {
            commands::collections::run(&client, command, format).await?
        }
        Commands::Data { command } => commands::data::run(&client, command, format).await?,
        Commands::Oplog { command } => commands::oplog::run(&client, command, format).await?,
        Commands::Discovery {
            discovery_url,
            account_id,
            command,
        } => {
            let discovery = DiscoveryClient::with_config(globals.config(&discovery_url))?;
            commands::discovery::run(&discovery, &account_id, command, format).await?
        }
        Commands::Version => {
            println!("Shilp CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_subcommands() {
        let cli = Cli::try_parse_from([
            "shilp",
            "--url",
            "http://db:3000",
            "oplog",
            "fetch",
            "--collection",
            "docs",
            "--after",
            "42",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.globals.url, "http://db:3000");
        assert_eq!(cli.globals.format, Format::Json);
        match cli.command {
            Commands::Oplog {
                command:
                    OplogCommand::Fetch {
                        collection, after, ..
                    },
            } => {
                assert_eq!(collection, "docs");
                assert_eq!(after, 42);
            }
            _ => panic!("expected oplog fetch"),
        }
    }

    #[test]
    fn dedicated_unregister_flag_selects_route() {
        let cli = Cli::try_parse_from(["shilp", "--dedicated-unregister", "health"]).unwrap();
        let config = cli.globals.config("http://localhost:3000");
        assert_eq!(config.unregister_route, UnregisterRoute::Dedicated);
    }
}
