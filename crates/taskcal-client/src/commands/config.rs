//! Configuration commands.

use std::path::Path;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &ClientConfig, path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", path.display());
    println!("{}", toml_str);
    Ok(())
}

/// Validate the configuration, resolving secret references.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    config.validate()?;
    for provider in taskcal_core::Provider::ALL {
        if config.provider(provider).is_configured() {
            println!("{} client_id resolves.", provider.display_name());
        }
    }
    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration and data paths.
pub fn path(config: &ClientConfig, path: &Path) -> ClientResult<()> {
    println!("config: {}", path.display());
    println!("data:   {}", config.data_dir().display());
    Ok(())
}
