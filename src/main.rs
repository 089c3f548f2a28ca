use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use harbor::config::{DEFAULT_CONFIG_FILE, HarborConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "harbor")]
#[command(version, about = "Host static sites, one dedicated server per project")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to harbor.toml
    #[arg(long, global = true, env = "HARBOR_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Restore stored projects and run the management API
    Serve {
        /// Port for the management API (overrides harbor.toml)
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface for the management API
        #[arg(long)]
        host: Option<String>,

        /// Enable dev mode (CORS permissive for local frontends)
        #[arg(long)]
        dev: bool,
    },
    /// Create the project database and projects directory
    Init,
    /// List stored projects
    List {
        /// Only projects owned by this account
        #[arg(long)]
        owner: Option<i64>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default harbor.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = HarborConfig::resolve(&cli.config)?;
    let _log_guard = harbor::telemetry::init(&config.logging, cli.verbose)?;

    match &cli.command {
        Commands::Serve { port, host, dev } => {
            if let Some(port) = port {
                config.server.port = *port;
            }
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            config.server.dev_mode |= *dev;
            cmd::cmd_serve(&config).await?;
        }
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::List { owner, json } => cmd::cmd_list(&config, *owner, *json)?,
        Commands::Config { command } => cmd::cmd_config(&cli.config, &config, command.clone())?,
    }

    Ok(())
}
