//! Connection lifecycle across providers.
//!
//! [`OAuthManager`] owns the view of every stored connection. It is built
//! explicitly with a [`TokenStore`] and the set of configured
//! [`AuthProvider`]s, and applies one policy: hand out the stored access token
//! while it is fresh, refresh once when it is not, and drop the connection
//! when the refresh service says the session is gone.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use taskcal_core::{Provider, Service};
use tracing::{debug, info, warn};

use super::connection::{ConnectionState, OAuthConnection, UserProfile};
use super::provider::AuthProvider;
use super::token_store::TokenStore;
use crate::error::{ProviderError, ProviderResult};

/// Snapshot of one provider's connection, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Provider key.
    pub provider: Provider,
    /// Derived state.
    pub state: ConnectionState,
    /// Connected account.
    pub user: Option<UserProfile>,
    /// When the connection was established.
    pub connected_at: Option<DateTime<Utc>>,
    /// When the access token expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// When a sync last completed.
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    fn of(provider: Provider, connection: Option<&OAuthConnection>, now: DateTime<Utc>) -> Self {
        Self {
            provider,
            state: ConnectionState::of(connection, now),
            user: connection.and_then(|c| c.user.clone()),
            connected_at: connection.map(|c| c.connected_at),
            expires_at: connection.and_then(|c| c.tokens.expires_at),
            last_sync_at: connection.and_then(|c| c.last_sync_at),
        }
    }
}

/// Orchestrates connect, refresh and disconnect for all providers.
pub struct OAuthManager {
    store: TokenStore,
    providers: HashMap<Provider, Arc<dyn AuthProvider>>,
    /// Serializes refreshes of one provider; providers never wait on each other.
    refresh_locks: HashMap<Provider, tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for OAuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthManager")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl OAuthManager {
    /// Creates a manager with no configured providers.
    pub fn new(store: TokenStore) -> Self {
        Self {
            store,
            providers: HashMap::new(),
            refresh_locks: Provider::ALL
                .iter()
                .map(|p| (*p, tokio::sync::Mutex::new(())))
                .collect(),
        }
    }

    /// Builder method to register an auth provider.
    pub fn with_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.providers.insert(provider.provider(), provider);
        self
    }

    /// Returns true if an auth provider is configured for `provider`.
    pub fn is_configured(&self, provider: Provider) -> bool {
        self.providers.contains_key(&provider)
    }

    fn auth_provider(&self, provider: Provider) -> ProviderResult<&Arc<dyn AuthProvider>> {
        self.providers.get(&provider).ok_or_else(|| {
            ProviderError::not_configured(format!(
                "no auth provider configured for {}",
                provider.display_name()
            ))
            .with_provider(provider.as_str())
        })
    }

    /// Runs the interactive authorization flow and saves the connection.
    ///
    /// The profile fetch afterwards is best-effort; on failure the connection
    /// is saved without a user.
    pub async fn connect(
        &self,
        provider: Provider,
        service: Service,
    ) -> ProviderResult<OAuthConnection> {
        let auth = self.auth_provider(provider)?;
        info!(%provider, %service, "connecting");

        let mut tokens = auth.authenticate(service).await?;
        if let Some(previous) = self.store.get(provider)? {
            tokens = tokens.inherit_from(&previous.tokens);
        }

        let mut connection = OAuthConnection::new(provider, tokens);
        match auth
            .fetch_user_profile(connection.tokens.access_token.clone())
            .await
        {
            Ok(user) => connection = connection.with_user(user),
            Err(e) => warn!(%provider, "could not fetch user profile: {}", e),
        }

        self.store.save(connection.clone())?;
        info!(%provider, "connected");
        Ok(connection)
    }

    /// Deletes the stored connection; idempotent.
    pub fn disconnect(&self, provider: Provider) -> ProviderResult<()> {
        self.store.remove(provider)?;
        info!(%provider, "disconnected");
        Ok(())
    }

    /// Returns true if a connection is stored for `provider`.
    pub fn is_connected(&self, provider: Provider) -> bool {
        match self.store.get(provider) {
            Ok(connection) => connection.is_some(),
            Err(e) => {
                warn!(%provider, "cannot read stored connections: {}", e);
                false
            }
        }
    }

    /// Returns the stored connection, if any.
    pub fn connection(&self, provider: Provider) -> ProviderResult<Option<OAuthConnection>> {
        self.store.get(provider)
    }

    /// Returns a usable access token, refreshing it if necessary.
    ///
    /// # Errors
    ///
    /// - `NoConnection` if the provider was never connected
    /// - `RefreshTokenMissing` if the token expired and cannot be renewed
    /// - `SessionExpired` if the refresh service rejected the refresh token;
    ///   the stored connection is deleted
    /// - `ExchangeServiceUnavailable` if the refresh service is unreachable;
    ///   the connection is kept
    pub async fn get_valid_access_token(&self, provider: Provider) -> ProviderResult<String> {
        let connection = self.require_connection(provider)?;
        if !connection.tokens.is_expired() {
            return Ok(connection.tokens.access_token);
        }
        self.refresh_locked(provider, false).await
    }

    /// Renews the access token even if it looks fresh.
    ///
    /// Used when a provider API rejects a token before its recorded expiry.
    pub async fn force_refresh(&self, provider: Provider) -> ProviderResult<String> {
        self.refresh_locked(provider, true).await
    }

    async fn refresh_locked(&self, provider: Provider, force: bool) -> ProviderResult<String> {
        let lock = self.refresh_locks.get(&provider).ok_or_else(|| {
            ProviderError::internal(format!("no refresh lock for {}", provider))
        })?;
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited
        let connection = self.require_connection(provider)?;
        if !force && !connection.tokens.is_expired() {
            return Ok(connection.tokens.access_token);
        }

        let refresh_token = connection.tokens.refresh_token.clone().ok_or_else(|| {
            ProviderError::refresh_token_missing(format!(
                "{} token expired and no refresh token is stored; reconnect required",
                provider.display_name()
            ))
            .with_provider(provider.as_str())
        })?;

        let auth = self.auth_provider(provider)?;
        debug!(%provider, "refreshing access token");
        match auth.refresh_access_token(refresh_token).await {
            Ok(tokens) => {
                let tokens = tokens.inherit_from(&connection.tokens);
                let access_token = tokens.access_token.clone();
                self.store.update_tokens(provider, tokens)?;
                info!(%provider, "access token refreshed");
                Ok(access_token)
            }
            Err(e) if e.requires_reconnect() => {
                warn!(%provider, code = %e.code(), "refresh needs reconnect, removing connection: {}", e);
                self.store.remove(provider)?;
                Err(ProviderError::session_expired(format!(
                    "{} session expired; reconnect required",
                    provider.display_name()
                ))
                .with_provider(provider.as_str())
                .with_source(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Stamps the last successful sync time.
    pub fn touch_last_sync(&self, provider: Provider) -> ProviderResult<()> {
        self.store.touch_last_sync(provider, Utc::now())
    }

    /// Returns the status of one provider.
    pub fn status(&self, provider: Provider) -> ProviderResult<ConnectionStatus> {
        let connection = self.store.get(provider)?;
        Ok(ConnectionStatus::of(provider, connection.as_ref(), Utc::now()))
    }

    /// Returns the status of every known provider.
    pub fn connections(&self) -> ProviderResult<Vec<ConnectionStatus>> {
        let stored = self.store.all()?;
        let now = Utc::now();
        Ok(Provider::ALL
            .iter()
            .map(|p| ConnectionStatus::of(*p, stored.iter().find(|c| c.provider == *p), now))
            .collect())
    }

    fn require_connection(&self, provider: Provider) -> ProviderResult<OAuthConnection> {
        self.store.get(provider)?.ok_or_else(|| {
            ProviderError::no_connection(format!("{} is not connected", provider.display_name()))
                .with_provider(provider.as_str())
        })
    }
}
