//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use taskcal_core::{Provider, Service};

/// taskcal - keep local tasks and events in sync with your providers
#[derive(Debug, Parser)]
#[command(name = "taskcal")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "TASKCAL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Returns true if the command runs until interrupted.
    pub fn is_long_running(&self) -> bool {
        matches!(self.command, Command::Sync { watch: true, .. })
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect, disconnect and inspect provider accounts
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Push local changes and pull remote ones
    Sync {
        /// Only sync this provider (google, microsoft, todoist)
        #[arg(long, short)]
        provider: Option<Provider>,

        /// Keep running and sync on an interval
        #[arg(long, short)]
        watch: bool,

        /// Seconds between passes in watch mode (overrides the config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Account actions.
#[derive(Debug, Subcommand)]
pub enum AuthAction {
    /// Authorize access to a provider in the browser
    Connect {
        /// Provider to connect (google, microsoft, todoist)
        provider: Provider,

        /// Service whose scopes are requested
        #[arg(long, short, default_value_t = Service::Tasks)]
        service: Service,

        /// OAuth client id; saved to the config file
        #[arg(long)]
        client_id: Option<String>,

        /// Print the consent URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Forget the stored connection of a provider
    Disconnect {
        /// Provider to disconnect
        provider: Provider,
    },

    /// Show the connection state of every provider
    Status,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration and data paths
    Path,
}
