//! taskcal CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use taskcal_core::{TracingConfig, init_tracing};

use taskcal_client::cli::{AuthAction, Cli, Command, ConfigAction};
use taskcal_client::commands;
use taskcal_client::config::ClientConfig;
use taskcal_client::error::ClientResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing = if cli.is_long_running() && !cli.debug {
        TracingConfig::watch()
    } else {
        TracingConfig::cli(cli.debug)
    };
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = if cli.config.is_some() {
        ClientConfig::load_from(&config_path)?
    } else {
        ClientConfig::load()?
    };

    match cli.command {
        Command::Auth { action } => match action {
            AuthAction::Connect {
                provider,
                service,
                client_id,
                no_browser,
            } => {
                commands::auth::connect(
                    config,
                    &config_path,
                    provider,
                    service,
                    client_id,
                    no_browser,
                )
                .await
            }
            AuthAction::Disconnect { provider } => commands::auth::disconnect(config, provider),
            AuthAction::Status => commands::auth::status(config, cli.json),
        },
        Command::Sync {
            provider,
            watch,
            interval,
        } => commands::sync::run(config, provider, watch, interval, cli.json).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config, &config_path),
        },
    }
}
