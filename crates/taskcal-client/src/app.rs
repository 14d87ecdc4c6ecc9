//! Wiring of stores, OAuth and sync providers from the configuration.

use std::path::PathBuf;
use std::sync::Arc;

use taskcal_core::{Event, Provider, Service, Task};
use taskcal_providers::auth::{ConsentLauncher, HttpTokenExchange, OAuthProvider, TokenExchange};
use taskcal_providers::{
    FileKeyValueStore, KeyValueStore, OAuthManager, SyncProvider, TokenStore,
    UnsupportedSyncProvider,
};
use taskcal_sync::SyncManager;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::store::JsonFileStore;

/// State file holding OAuth connections and list mappings.
pub const STATE_FILE: &str = "state.json";
/// Local tasks.
pub const TASKS_FILE: &str = "tasks.json";
/// Local events.
pub const EVENTS_FILE: &str = "events.json";

/// Everything a command needs, built once from the configuration.
pub struct App {
    /// Loaded configuration.
    pub config: ClientConfig,
    /// Persistent key-value state.
    pub kv: Arc<dyn KeyValueStore>,
    /// OAuth lifecycle manager.
    pub oauth: Arc<OAuthManager>,
    /// Local tasks.
    pub tasks: Arc<JsonFileStore<Task>>,
    /// Local events.
    pub events: Arc<JsonFileStore<Event>>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("data_dir", &self.config.data_dir())
            .field("oauth", &self.oauth)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Opens the data directory and registers every configured auth provider.
    pub fn open(config: ClientConfig, launcher: Arc<dyn ConsentLauncher>) -> ClientResult<Self> {
        let data_dir = config.data_dir();
        debug!(data_dir = %data_dir.display(), "opening local state");

        let kv: Arc<dyn KeyValueStore> =
            Arc::new(FileKeyValueStore::new(data_dir.join(STATE_FILE)));
        let exchange: Arc<dyn TokenExchange> = Arc::new(HttpTokenExchange::new(
            config.exchange.to_exchange_config()?,
        ));

        let mut oauth = OAuthManager::new(TokenStore::new(kv.clone()));
        for provider in Provider::ALL {
            if let Some(auth_config) = config.provider(provider).auth_config(provider)? {
                oauth = oauth.with_provider(Arc::new(OAuthProvider::new(
                    auth_config,
                    exchange.clone(),
                    launcher.clone(),
                )));
            }
        }

        Ok(Self {
            tasks: Arc::new(JsonFileStore::new(data_dir.join(TASKS_FILE))),
            events: Arc::new(JsonFileStore::new(data_dir.join(EVENTS_FILE))),
            config,
            kv,
            oauth: Arc::new(oauth),
        })
    }

    /// Returns the data directory in use.
    pub fn data_dir(&self) -> PathBuf {
        self.config.data_dir()
    }

    /// Builds the sync providers named in `[sync] providers`.
    pub fn sync_providers(&self) -> Vec<Arc<dyn SyncProvider>> {
        let sync = &self.config.sync;
        let mut providers: Vec<Arc<dyn SyncProvider>> = Vec::new();

        #[cfg(feature = "google")]
        {
            use taskcal_providers::google::{self, GoogleCalendarApi, GoogleEventMapper};
            use taskcal_providers::{SyncEngine, SyncSettings};

            if sync.is_enabled("google-tasks") {
                let settings = SyncSettings {
                    collections: sync.task_lists.clone(),
                    poll_interval: sync.interval(),
                    ..SyncSettings::default()
                };
                providers.push(Arc::new(
                    google::tasks_sync(self.oauth.clone(), self.kv.clone(), self.tasks.clone())
                        .with_settings(settings),
                ));
            }
            if sync.is_enabled("google-calendar") {
                let settings = SyncSettings {
                    collections: sync.calendars.clone(),
                    poll_interval: sync.interval(),
                    ..SyncSettings::default()
                };
                let api = GoogleCalendarApi::default()
                    .with_window(sync.window_back_months, sync.window_forward_months);
                providers.push(Arc::new(
                    SyncEngine::new(
                        api,
                        GoogleEventMapper,
                        self.oauth.clone(),
                        self.kv.clone(),
                        self.events.clone(),
                    )
                    .with_settings(settings),
                ));
            }
        }

        for (name, provider, service) in [
            ("microsoft-tasks", Provider::Microsoft, Service::Tasks),
            ("microsoft-calendar", Provider::Microsoft, Service::Calendar),
            ("todoist-tasks", Provider::Todoist, Service::Tasks),
        ] {
            if sync.is_enabled(name) {
                providers.push(Arc::new(
                    UnsupportedSyncProvider::new(provider, service).with_enabled(true),
                ));
            }
        }

        providers
    }

    /// Builds a manager over [`sync_providers`](Self::sync_providers).
    pub fn sync_manager(&self) -> ClientResult<SyncManager> {
        let mut manager = SyncManager::new();
        for provider in self.sync_providers() {
            manager.register(provider)?;
        }
        Ok(manager)
    }
}
