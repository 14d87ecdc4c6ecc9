//! Persistence of OAuth connections.
//!
//! All connections are serialized together as one JSON array under a single
//! key of the backing [`KeyValueStore`]. At most one record exists per
//! provider; saving a connection replaces the previous record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use taskcal_core::Provider;
use tracing::debug;

use super::connection::{OAuthConnection, OAuthTokens};
use crate::error::{ProviderError, ProviderResult};
use crate::kv::KeyValueStore;

/// Key under which the connection collection is stored.
pub const CONNECTIONS_KEY: &str = "oauth_connections";

/// Reads and writes [`OAuthConnection`] records.
#[derive(Clone)]
pub struct TokenStore {
    kv: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Creates a token store over the given key-value store.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Returns every stored connection.
    pub fn all(&self) -> ProviderResult<Vec<OAuthConnection>> {
        match self.kv.get(CONNECTIONS_KEY)? {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                ProviderError::storage(format!("failed to parse stored connections: {}", e))
                    .with_source(e)
            }),
        }
    }

    /// Returns the connection for `provider`, if any.
    pub fn get(&self, provider: Provider) -> ProviderResult<Option<OAuthConnection>> {
        Ok(self.all()?.into_iter().find(|c| c.provider == provider))
    }

    /// Saves a connection, replacing any existing record for its provider.
    pub fn save(&self, connection: OAuthConnection) -> ProviderResult<()> {
        let mut connections = self.all()?;
        connections.retain(|c| c.provider != connection.provider);
        debug!(provider = %connection.provider, "saving connection");
        connections.push(connection);
        self.write(&connections)
    }

    /// Replaces the tokens of an existing connection.
    pub fn update_tokens(&self, provider: Provider, tokens: OAuthTokens) -> ProviderResult<()> {
        self.modify(provider, |c| c.tokens = tokens)
    }

    /// Stamps the last successful sync time of an existing connection.
    pub fn touch_last_sync(&self, provider: Provider, at: DateTime<Utc>) -> ProviderResult<()> {
        self.modify(provider, |c| c.last_sync_at = Some(at))
    }

    /// Deletes the connection for `provider`; deleting a missing one is a no-op.
    pub fn remove(&self, provider: Provider) -> ProviderResult<()> {
        let mut connections = self.all()?;
        let before = connections.len();
        connections.retain(|c| c.provider != provider);
        if connections.len() == before {
            return Ok(());
        }
        debug!(%provider, "removing connection");
        if connections.is_empty() {
            self.kv.remove(CONNECTIONS_KEY)
        } else {
            self.write(&connections)
        }
    }

    fn modify(
        &self,
        provider: Provider,
        f: impl FnOnce(&mut OAuthConnection),
    ) -> ProviderResult<()> {
        let mut connections = self.all()?;
        let connection = connections
            .iter_mut()
            .find(|c| c.provider == provider)
            .ok_or_else(|| {
                ProviderError::no_connection(format!("{} is not connected", provider))
                    .with_provider(provider.as_str())
            })?;
        f(connection);
        self.write(&connections)
    }

    fn write(&self, connections: &[OAuthConnection]) -> ProviderResult<()> {
        let raw = serde_json::to_string(connections)
            .map_err(|e| ProviderError::internal(format!("failed to serialize connections: {}", e)))?;
        self.kv.set(CONNECTIONS_KEY, raw)
    }
}
