//! Client configuration.
//!
//! All settings live in `~/.config/taskcal/config.toml`. Every section is
//! optional; a missing file yields the defaults.
//!
//! ```toml
//! [exchange]
//! url = "http://127.0.0.1:8787"
//! timeout_secs = 30
//!
//! [google]
//! client_id = "env::TASKCAL_GOOGLE_CLIENT_ID"
//! redirect_port = 8976
//!
//! [sync]
//! providers = ["google-tasks", "google-calendar"]
//! task_lists = ["Work"]
//! calendars = []
//! interval_secs = 300
//!
//! [storage]
//! data_dir = "/home/me/.local/share/taskcal"
//! ```
//!
//! Provider `client_id` values support secret references, see
//! [`crate::secret`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskcal_core::Provider;
use taskcal_providers::auth::ExchangeConfig;
use taskcal_providers::auth::exchange::DEFAULT_EXCHANGE_URL;
use taskcal_providers::auth::provider::{AuthProviderConfig, loopback_redirect_uri};

use crate::error::{ClientError, ClientResult};

/// Configuration for the taskcal client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Token exchange service.
    pub exchange: ExchangeSettings,

    /// Google settings.
    pub google: ProviderSettings,

    /// Microsoft settings.
    pub microsoft: ProviderSettings,

    /// Todoist settings.
    pub todoist: ProviderSettings,

    /// Sync settings.
    pub sync: SyncSection,

    /// Storage settings.
    pub storage: StorageSettings,
}

/// Location of the token exchange service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    /// Base URL of the service.
    pub url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_EXCHANGE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl ExchangeSettings {
    /// Converts to the exchange client configuration.
    pub fn to_exchange_config(&self) -> ClientResult<ExchangeConfig> {
        let config = ExchangeConfig::new(&self.url)
            .with_timeout(Duration::from_secs(self.timeout_secs.max(1)));
        config.validate()?;
        Ok(config)
    }
}

/// OAuth client settings of one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// OAuth client id (supports `pass::` and `env::` prefixes).
    pub client_id: Option<String>,

    /// Loopback port for the consent redirect.
    pub redirect_port: Option<u16>,
}

impl ProviderSettings {
    /// Returns true if a client id is set.
    pub fn is_configured(&self) -> bool {
        self.client_id.is_some()
    }

    /// Builds the auth configuration for `provider`, resolving the client id.
    ///
    /// Returns `None` when no client id is configured.
    pub fn auth_config(&self, provider: Provider) -> ClientResult<Option<AuthProviderConfig>> {
        let Some(raw) = self.client_id.as_deref() else {
            return Ok(None);
        };
        let client_id = crate::secret::resolve(raw).map_err(|e| {
            ClientError::config(format!("[{}] client_id: {}", provider, e))
        })?;

        let mut config = AuthProviderConfig::preset(provider, client_id);
        if let Some(port) = self.redirect_port {
            config = config.with_redirect_uri(loopback_redirect_uri(port));
        }
        config.validate()?;
        Ok(Some(config))
    }
}

/// What to sync and how often.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    /// Enabled sync providers, by name (`google-tasks`, `google-calendar`).
    pub providers: Vec<String>,

    /// Named task lists pulled on every pass besides the default list.
    pub task_lists: Vec<String>,

    /// Named calendars pulled on every pass besides the primary calendar.
    pub calendars: Vec<String>,

    /// Seconds between passes in watch mode.
    pub interval_secs: u64,

    /// Months of past events to pull.
    pub window_back_months: u32,

    /// Months of future events to pull.
    pub window_forward_months: u32,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            providers: vec!["google-tasks".to_string(), "google-calendar".to_string()],
            task_lists: Vec::new(),
            calendars: Vec::new(),
            interval_secs: 300,
            window_back_months: 3,
            window_forward_months: 3,
        }
    }
}

impl SyncSection {
    /// Returns true if the named provider is enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.providers.iter().any(|p| p == name)
    }

    /// Returns the polling interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Where local state lives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Overrides the data directory.
    pub data_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> ClientResult<Self> {
        toml::from_str(content)
            .map_err(|e| ClientError::config(format!("failed to parse config: {}", e)))
    }

    /// Returns the settings of `provider`.
    pub fn provider(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::Google => &self.google,
            Provider::Microsoft => &self.microsoft,
            Provider::Todoist => &self.todoist,
        }
    }

    /// Returns the settings of `provider` for modification.
    pub fn provider_mut(&mut self, provider: Provider) -> &mut ProviderSettings {
        match provider {
            Provider::Google => &mut self.google,
            Provider::Microsoft => &mut self.microsoft,
            Provider::Todoist => &mut self.todoist,
        }
    }

    /// Returns the data directory, honouring the `[storage]` override.
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Checks every section and resolves configured client ids.
    pub fn validate(&self) -> ClientResult<()> {
        self.exchange.to_exchange_config()?;
        for provider in Provider::ALL {
            self.provider(provider).auth_config(provider)?;
        }
        for name in &self.sync.providers {
            if !KNOWN_SYNC_PROVIDERS.contains(&name.as_str()) {
                return Err(ClientError::config(format!(
                    "unknown sync provider '{}' (expected one of: {})",
                    name,
                    KNOWN_SYNC_PROVIDERS.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("taskcal")
    }

    /// Returns the default data directory path.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("taskcal")
    }
}

/// Sync provider names accepted in `[sync] providers`.
pub const KNOWN_SYNC_PROVIDERS: [&str; 5] = [
    "google-tasks",
    "google-calendar",
    "microsoft-tasks",
    "microsoft-calendar",
    "todoist-tasks",
];

/// Writes `client_id` into the `[provider]` table of the config file at
/// `path`, keeping the rest of the file as written.
pub fn save_client_id(path: &Path, provider: Provider, client_id: &str) -> ClientResult<()> {
    let content = if path.exists() {
        std::fs::read_to_string(path)?
    } else {
        String::new()
    };

    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| ClientError::config(format!("failed to parse {}: {}", path.display(), e)))?;

    let key = provider.as_str();
    if !doc.contains_key(key) {
        doc[key] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    match doc[key].as_table_mut() {
        Some(table) => table["client_id"] = toml_edit::value(client_id),
        None => {
            return Err(ClientError::config(format!(
                "'{}' in {} is not a table",
                key,
                path.display()
            )));
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, doc.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_use_defaults() {
        let config = ClientConfig::parse("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.exchange.url, DEFAULT_EXCHANGE_URL);
        assert!(config.sync.is_enabled("google-tasks"));
        assert_eq!(config.sync.interval(), Duration::from_secs(300));
        assert!(config.google.auth_config(Provider::Google).unwrap().is_none());
    }

    #[test]
    fn parses_all_sections() {
        let config = ClientConfig::parse(
            r#"
[exchange]
url = "https://exchange.example.com"
timeout_secs = 10

[google]
client_id = "abc.apps.googleusercontent.com"
redirect_port = 9000

[todoist]
client_id = "todo-id"

[sync]
providers = ["google-tasks"]
task_lists = ["Work", "Home"]
interval_secs = 60

[storage]
data_dir = "/tmp/taskcal"
"#,
        )
        .unwrap();

        assert_eq!(
            config.exchange.to_exchange_config().unwrap().timeout,
            Duration::from_secs(10)
        );
        assert!(!config.sync.is_enabled("google-calendar"));
        assert_eq!(config.sync.task_lists, vec!["Work", "Home"]);
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/taskcal"));
        assert!(config.provider(Provider::Todoist).is_configured());
        assert!(!config.provider(Provider::Microsoft).is_configured());

        let google = config
            .google
            .auth_config(Provider::Google)
            .unwrap()
            .unwrap();
        assert_eq!(google.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(google.redirect_uri, "http://127.0.0.1:9000/callback");
        config.validate().unwrap();
    }

    #[test]
    fn client_id_env_reference_is_resolved() {
        unsafe {
            std::env::set_var("_TASKCAL_TEST_GOOGLE_ID", "env-id.apps.googleusercontent.com");
        }
        let settings = ProviderSettings {
            client_id: Some("env::_TASKCAL_TEST_GOOGLE_ID".to_string()),
            redirect_port: None,
        };
        let config = settings.auth_config(Provider::Google).unwrap().unwrap();
        assert_eq!(config.client_id, "env-id.apps.googleusercontent.com");
        unsafe {
            std::env::remove_var("_TASKCAL_TEST_GOOGLE_ID");
        }
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = ClientConfig::default();
        config.exchange.url = "ftp://nope".to_string();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.sync.providers.push("dropbox-files".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dropbox-files"));

        let mut config = ClientConfig::default();
        config.google.client_id = Some("env::_TASKCAL_UNSET_VAR_98765".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_client_id_preserves_other_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "# mine\n[sync]\ninterval_secs = 120\n").unwrap();

        save_client_id(&path, Provider::Google, "new-id").unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# mine"));
        let config = ClientConfig::load_from(&path).unwrap();
        assert_eq!(config.google.client_id.as_deref(), Some("new-id"));
        assert_eq!(config.sync.interval_secs, 120);
    }

    #[test]
    fn save_client_id_creates_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        save_client_id(&path, Provider::Todoist, "todo").unwrap();
        let config = ClientConfig::load_from(&path).unwrap();
        assert_eq!(config.todoist.client_id.as_deref(), Some("todo"));
    }
}
