//! Persisted connection records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use taskcal_core::Provider;

/// Safety margin subtracted from `expires_at` when deciding whether a token
/// can still be used.
pub const EXPIRY_MARGIN: Duration = Duration::minutes(5);

/// Tokens issued for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthTokens {
    /// The access token for API requests.
    pub access_token: String,
    /// The refresh token for obtaining new access tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token expires; absent means it never does.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Token type, normally `Bearer`.
    pub token_type: String,
    /// Space-separated granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

impl OAuthTokens {
    /// Creates a bearer token set without refresh token or expiry.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            token_type: "Bearer".to_string(),
            scope: None,
        }
    }

    /// Builder method to set the refresh token.
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    /// Builder method to set the absolute expiry.
    pub fn with_expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Returns true if the token is expired, or will be within
    /// [`EXPIRY_MARGIN`], at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at - EXPIRY_MARGIN,
            // Some providers issue non-expiring tokens
            None => false,
        }
    }

    /// Returns true if the token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Carries over the refresh token and scope from `previous` when a
    /// renewal response omits them.
    pub fn inherit_from(mut self, previous: &OAuthTokens) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.refresh_token.clone();
        }
        if self.scope.is_none() {
            self.scope = previous.scope.clone();
        }
        self
    }
}

/// Profile of the connected account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Account email.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub picture: Option<String>,
}

/// The persisted credential and profile record for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthConnection {
    /// Provider key.
    pub provider: Provider,
    /// Current tokens.
    pub tokens: OAuthTokens,
    /// Connected account, when the profile fetch succeeded.
    #[serde(default)]
    pub user: Option<UserProfile>,
    /// When the connection was established.
    pub connected_at: DateTime<Utc>,
    /// When a sync last completed.
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl OAuthConnection {
    /// Creates a new connection stamped with the current time.
    pub fn new(provider: Provider, tokens: OAuthTokens) -> Self {
        Self {
            provider,
            tokens,
            user: None,
            connected_at: Utc::now(),
            last_sync_at: None,
        }
    }

    /// Builder method to set the user profile.
    pub fn with_user(mut self, user: UserProfile) -> Self {
        self.user = Some(user);
        self
    }
}

/// Connection state reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No stored connection.
    Disconnected,
    /// Token usable without a network call.
    Valid,
    /// Token expired but a refresh token is available.
    NeedsRefresh,
    /// Token expired and cannot be renewed; reconnect required.
    NeedsReconnect,
}

impl ConnectionState {
    /// Derives the state of an optional connection at `now`.
    pub fn of(connection: Option<&OAuthConnection>, now: DateTime<Utc>) -> Self {
        match connection {
            None => Self::Disconnected,
            Some(c) if !c.tokens.is_expired_at(now) => Self::Valid,
            Some(c) if c.tokens.refresh_token.is_some() => Self::NeedsRefresh,
            Some(_) => Self::NeedsReconnect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_applies_five_minute_margin() {
        let now = Utc::now();
        let tokens = OAuthTokens::bearer("a").with_expires_at(now + Duration::minutes(6));
        assert!(!tokens.is_expired_at(now));

        let tokens = OAuthTokens::bearer("a").with_expires_at(now + Duration::minutes(4));
        assert!(tokens.is_expired_at(now));
    }

    #[test]
    fn missing_expiry_is_always_valid() {
        let tokens = OAuthTokens::bearer("a");
        assert!(!tokens.is_expired());
    }

    #[test]
    fn inherit_keeps_refresh_token() {
        let old = OAuthTokens::bearer("old").with_refresh_token("r1");
        let renewed = OAuthTokens::bearer("new").inherit_from(&old);
        assert_eq!(renewed.access_token, "new");
        assert_eq!(renewed.refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn connection_state_derivation() {
        let now = Utc::now();
        assert_eq!(ConnectionState::of(None, now), ConnectionState::Disconnected);

        let expired = OAuthTokens::bearer("a").with_expires_at(now - Duration::hours(1));
        let conn = OAuthConnection::new(Provider::Google, expired.clone());
        assert_eq!(
            ConnectionState::of(Some(&conn), now),
            ConnectionState::NeedsReconnect
        );

        let conn = OAuthConnection::new(Provider::Google, expired.with_refresh_token("r"));
        assert_eq!(
            ConnectionState::of(Some(&conn), now),
            ConnectionState::NeedsRefresh
        );
    }

    #[test]
    fn connection_serializes_camel_case() {
        let conn = OAuthConnection::new(Provider::Todoist, OAuthTokens::bearer("t"));
        let json = serde_json::to_value(&conn).unwrap();
        assert_eq!(json["provider"], "todoist");
        assert_eq!(json["tokens"]["accessToken"], "t");
        assert_eq!(json["tokens"]["tokenType"], "Bearer");
        assert!(json["connectedAt"].is_string());
    }
}
