//! Account commands.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use taskcal_core::{Provider, Service};
use taskcal_providers::auth::{
    ConnectionState, ConnectionStatus, ConsentLauncher, LoopbackLauncher,
};
use tracing::info;

use crate::app::App;
use crate::config::{ClientConfig, save_client_id};
use crate::error::{ClientError, ClientResult};

/// Runs the consent flow for `provider` and stores the connection.
///
/// A `client_id` given on the command line is written to the config file
/// first so later runs find it.
pub async fn connect(
    mut config: ClientConfig,
    config_path: &Path,
    provider: Provider,
    service: Service,
    client_id: Option<String>,
    no_browser: bool,
) -> ClientResult<()> {
    if let Some(id) = client_id {
        save_client_id(config_path, provider, &id)?;
        println!("Saved {} client_id to {}", provider, config_path.display());
        config.provider_mut(provider).client_id = Some(id);
    }

    let launcher: Arc<dyn ConsentLauncher> = if no_browser {
        Arc::new(LoopbackLauncher::headless())
    } else {
        Arc::new(LoopbackLauncher::new())
    };
    let app = App::open(config, launcher)?;

    if !app.oauth.is_configured(provider) {
        return Err(ClientError::config(format!(
            "no client_id for {}. Add it to {}:\n  [{}]\n  client_id = \"...\"\n\n  \
             or run: taskcal auth connect {} --client-id <ID>",
            provider.display_name(),
            config_path.display(),
            provider,
            provider
        )));
    }

    println!("Connecting to {} ({})...", provider.display_name(), service);
    if no_browser {
        println!("Open the URL printed below in a browser to continue.");
    } else {
        println!("A browser window will open for you to authorize access.");
    }

    let connection = app.oauth.connect(provider, service).await?;
    info!(%provider, "connection stored");

    match connection.user.as_ref().and_then(|u| u.email.as_deref()) {
        Some(email) => println!("Connected to {} as {}.", provider.display_name(), email),
        None => println!("Connected to {}.", provider.display_name()),
    }
    Ok(())
}

/// Removes the stored connection of `provider`.
pub fn disconnect(config: ClientConfig, provider: Provider) -> ClientResult<()> {
    let app = App::open(config, Arc::new(LoopbackLauncher::headless()))?;
    let was_connected = app.oauth.connection(provider)?.is_some();
    app.oauth.disconnect(provider)?;
    if was_connected {
        println!("Disconnected from {}.", provider.display_name());
    } else {
        println!("{} was not connected.", provider.display_name());
    }
    Ok(())
}

/// Prints the connection state of every provider.
pub fn status(config: ClientConfig, json: bool) -> ClientResult<()> {
    let app = App::open(config, Arc::new(LoopbackLauncher::headless()))?;
    let statuses = app.oauth.connections()?;
    if json {
        let out = serde_json::to_string_pretty(&statuses)
            .map_err(|e| ClientError::config(format!("failed to serialize status: {}", e)))?;
        println!("{}", out);
    } else {
        print!("{}", format_status(&statuses, Utc::now()));
    }
    Ok(())
}

fn state_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "not connected",
        ConnectionState::Valid => "connected",
        ConnectionState::NeedsRefresh => "connected (token refresh due)",
        ConnectionState::NeedsReconnect => "expired, reconnect required",
    }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Renders one block per provider.
pub fn format_status(statuses: &[ConnectionStatus], now: DateTime<Utc>) -> String {
    let mut out = String::new();
    for status in statuses {
        out.push_str(&format!(
            "{}: {}\n",
            status.provider.display_name(),
            state_label(status.state)
        ));
        if status.state == ConnectionState::Disconnected {
            continue;
        }
        if let Some(user) = &status.user
            && let Some(account) = user.email.as_deref().or(user.name.as_deref())
        {
            out.push_str(&format!("  account:   {}\n", account));
        }
        match status.expires_at {
            Some(at) if at > now => {
                let minutes = (at - now).num_minutes();
                out.push_str(&format!("  expires:   in {} min\n", minutes));
            }
            Some(at) => out.push_str(&format!("  expired:   {}\n", local_time(at))),
            None => out.push_str("  expires:   never\n"),
        }
        match status.last_sync_at {
            Some(at) => out.push_str(&format!("  last sync: {}\n", local_time(at))),
            None => out.push_str("  last sync: never\n"),
        }
    }
    out
}
