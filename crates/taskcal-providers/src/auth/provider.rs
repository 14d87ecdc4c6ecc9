//! Per-provider authorization: consent URL, interactive flow, token renewal.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use taskcal_core::{Provider, Service};
use tracing::{debug, info};
use url::Url;

use super::connection::{OAuthTokens, UserProfile};
use super::exchange::TokenExchange;
use super::session::{AuthorizationSession, ConsentLauncher};
use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

/// Default loopback port for the OAuth redirect.
pub const DEFAULT_REDIRECT_PORT: u16 = 8976;

/// Immutable description of one OAuth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthProviderConfig {
    /// Provider key.
    pub provider: Provider,
    /// OAuth client id (public; the secret stays with the exchange service).
    pub client_id: String,
    /// Authorization endpoint.
    pub authorization_url: String,
    /// Endpoint returning the signed-in user's profile, if the provider has one.
    pub userinfo_url: Option<String>,
    /// Scopes needed for task access.
    pub tasks_scopes: Vec<String>,
    /// Scopes needed for calendar access.
    pub calendar_scopes: Vec<String>,
    /// Scopes requested with every consent (identity, offline access).
    pub base_scopes: Vec<String>,
    /// Separator used to join scopes in the authorization URL.
    pub scope_separator: &'static str,
    /// Where the provider sends the user after consent.
    pub redirect_uri: String,
    /// Additional authorization query parameters.
    pub extra_params: Vec<(String, String)>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn pairs(values: &[(&str, &str)]) -> Vec<(String, String)> {
    values
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Returns the loopback redirect URI for `port`.
pub fn loopback_redirect_uri(port: u16) -> String {
    format!("http://127.0.0.1:{}/callback", port)
}

impl AuthProviderConfig {
    /// Google (Tasks and Calendar).
    ///
    /// `access_type=offline` plus forced consent guarantees a refresh token.
    pub fn google(client_id: impl Into<String>) -> Self {
        Self {
            provider: Provider::Google,
            client_id: client_id.into(),
            authorization_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            userinfo_url: Some("https://openidconnect.googleapis.com/v1/userinfo".to_string()),
            tasks_scopes: strings(&["https://www.googleapis.com/auth/tasks"]),
            calendar_scopes: strings(&["https://www.googleapis.com/auth/calendar"]),
            base_scopes: strings(&["openid", "email", "profile"]),
            scope_separator: " ",
            redirect_uri: loopback_redirect_uri(DEFAULT_REDIRECT_PORT),
            extra_params: pairs(&[
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("include_granted_scopes", "true"),
            ]),
        }
    }

    /// Microsoft identity platform (To Do and Outlook calendar).
    pub fn microsoft(client_id: impl Into<String>) -> Self {
        Self {
            provider: Provider::Microsoft,
            client_id: client_id.into(),
            authorization_url: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize"
                .to_string(),
            userinfo_url: Some("https://graph.microsoft.com/oidc/userinfo".to_string()),
            tasks_scopes: strings(&["Tasks.ReadWrite"]),
            calendar_scopes: strings(&["Calendars.ReadWrite"]),
            base_scopes: strings(&["openid", "email", "profile", "offline_access", "User.Read"]),
            scope_separator: " ",
            redirect_uri: loopback_redirect_uri(DEFAULT_REDIRECT_PORT),
            extra_params: pairs(&[("prompt", "consent")]),
        }
    }

    /// Todoist (tasks only).
    pub fn todoist(client_id: impl Into<String>) -> Self {
        Self {
            provider: Provider::Todoist,
            client_id: client_id.into(),
            authorization_url: "https://todoist.com/oauth/authorize".to_string(),
            userinfo_url: None,
            tasks_scopes: strings(&["data:read_write"]),
            calendar_scopes: Vec::new(),
            base_scopes: Vec::new(),
            scope_separator: ",",
            redirect_uri: loopback_redirect_uri(DEFAULT_REDIRECT_PORT),
            extra_params: Vec::new(),
        }
    }

    /// Returns the preset for `provider`.
    pub fn preset(provider: Provider, client_id: impl Into<String>) -> Self {
        match provider {
            Provider::Google => Self::google(client_id),
            Provider::Microsoft => Self::microsoft(client_id),
            Provider::Todoist => Self::todoist(client_id),
        }
    }

    /// Builder method to set the redirect URI.
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    /// Builder method to point at a different authorization endpoint.
    pub fn with_authorization_url(mut self, url: impl Into<String>) -> Self {
        self.authorization_url = url.into();
        self
    }

    /// Builder method to point at a different userinfo endpoint.
    pub fn with_userinfo_url(mut self, url: Option<String>) -> Self {
        self.userinfo_url = url;
        self
    }

    /// Scopes to request for `service`.
    pub fn scopes_for(&self, service: Service) -> Vec<String> {
        let service_scopes = match service {
            Service::Tasks => &self.tasks_scopes,
            Service::Calendar => &self.calendar_scopes,
        };
        self.base_scopes
            .iter()
            .chain(service_scopes.iter())
            .cloned()
            .collect()
    }

    /// Returns true if the provider offers access to `service`.
    pub fn supports(&self, service: Service) -> bool {
        match service {
            Service::Tasks => !self.tasks_scopes.is_empty(),
            Service::Calendar => !self.calendar_scopes.is_empty(),
        }
    }

    /// Parses and checks the configured URLs.
    pub fn validate(&self) -> ProviderResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(ProviderError::configuration("client_id is required")
                .with_provider(self.provider.as_str()));
        }
        for url in [&self.authorization_url, &self.redirect_uri] {
            Url::parse(url).map_err(|e| {
                ProviderError::configuration(format!("invalid URL '{}': {}", url, e))
                    .with_provider(self.provider.as_str())
            })?;
        }
        Ok(())
    }

    /// Builds the consent URL for `service` carrying `state`.
    pub fn authorization_url(&self, service: Service, state: &str) -> ProviderResult<Url> {
        if !self.supports(service) {
            return Err(ProviderError::not_implemented(format!(
                "{} does not offer {} access",
                self.provider.display_name(),
                service
            ))
            .with_provider(self.provider.as_str()));
        }

        let mut url = Url::parse(&self.authorization_url).map_err(|e| {
            ProviderError::configuration(format!("invalid authorization URL: {}", e))
                .with_provider(self.provider.as_str())
        })?;

        let scope = self.scopes_for(service).join(self.scope_separator);
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", &scope)
                .append_pair("state", state);
            for (key, value) in &self.extra_params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Authorization operations for one provider.
pub trait AuthProvider: Send + Sync {
    /// Returns the provider key.
    fn provider(&self) -> Provider;

    /// Runs the interactive consent flow for `service` and returns tokens.
    fn authenticate(&self, service: Service) -> BoxFuture<'_, ProviderResult<OAuthTokens>>;

    /// Renews tokens through the trusted refresh service.
    fn refresh_access_token(
        &self,
        refresh_token: String,
    ) -> BoxFuture<'_, ProviderResult<OAuthTokens>>;

    /// Fetches the signed-in user's profile.
    fn fetch_user_profile(&self, access_token: String)
    -> BoxFuture<'_, ProviderResult<UserProfile>>;
}

/// Standard OAuth authorization-code implementation of [`AuthProvider`].
pub struct OAuthProvider {
    config: AuthProviderConfig,
    exchange: Arc<dyn TokenExchange>,
    launcher: Arc<dyn ConsentLauncher>,
    http_client: reqwest::Client,
    session_timing: Option<(Duration, Duration)>,
}

impl std::fmt::Debug for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OAuthProvider {
    /// Creates a provider from its configuration and collaborators.
    pub fn new(
        config: AuthProviderConfig,
        exchange: Arc<dyn TokenExchange>,
        launcher: Arc<dyn ConsentLauncher>,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to create HTTP client");

        Self {
            config,
            exchange,
            launcher,
            http_client,
            session_timing: None,
        }
    }

    /// Overrides the window poll interval and timeout of consent sessions.
    pub fn with_session_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.session_timing = Some((poll_interval, timeout));
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AuthProviderConfig {
        &self.config
    }

    async fn run_consent(&self, service: Service) -> ProviderResult<OAuthTokens> {
        let provider = self.config.provider;
        let redirect_uri = Url::parse(&self.config.redirect_uri).map_err(|e| {
            ProviderError::configuration(format!("invalid redirect URI: {}", e))
                .with_provider(provider.as_str())
        })?;

        let mut session = AuthorizationSession::new(redirect_uri);
        if let Some((poll, timeout)) = self.session_timing {
            session = session.with_timing(poll, timeout);
        }
        let url = self
            .config
            .authorization_url(service, session.pending().state())?;
        debug!(%provider, %service, "authorization URL: {}", url);

        let window = self.launcher.launch(url, session.pending()).await?;
        let code = session
            .wait(window.as_ref())
            .await
            .map_err(|e| e.with_provider(provider.as_str()))?;
        drop(window);

        info!(%provider, "received authorization code, exchanging for tokens");
        self.exchange
            .exchange(provider, code, self.config.redirect_uri.clone())
            .await
    }
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl AuthProvider for OAuthProvider {
    fn provider(&self) -> Provider {
        self.config.provider
    }

    fn authenticate(&self, service: Service) -> BoxFuture<'_, ProviderResult<OAuthTokens>> {
        Box::pin(self.run_consent(service))
    }

    fn refresh_access_token(
        &self,
        refresh_token: String,
    ) -> BoxFuture<'_, ProviderResult<OAuthTokens>> {
        self.exchange.refresh(self.config.provider, refresh_token)
    }

    fn fetch_user_profile(
        &self,
        access_token: String,
    ) -> BoxFuture<'_, ProviderResult<UserProfile>> {
        Box::pin(async move {
            let provider = self.config.provider;
            let Some(url) = self.config.userinfo_url.as_deref() else {
                return Err(ProviderError::not_implemented("provider has no profile endpoint")
                    .with_provider(provider.as_str()));
            };

            let response = self
                .http_client
                .get(url)
                .bearer_auth(&access_token)
                .send()
                .await
                .map_err(|e| {
                    ProviderError::network(format!("profile request failed: {}", e))
                        .with_provider(provider.as_str())
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(ProviderError::authentication(format!(
                    "profile request rejected ({})",
                    status
                ))
                .with_provider(provider.as_str()));
            }

            let info: UserInfoResponse = response.json().await.map_err(|e| {
                ProviderError::invalid_response(format!("invalid profile response: {}", e))
                    .with_provider(provider.as_str())
            })?;

            Ok(UserProfile {
                email: info.email,
                name: info.name,
                picture: info.picture,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::{AuthMessage, ConsentWindow, PendingAuthorization};
    use crate::error::ProviderErrorCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct CountingExchange {
        exchanges: AtomicUsize,
    }

    impl TokenExchange for CountingExchange {
        fn exchange(
            &self,
            _provider: Provider,
            code: String,
            _redirect_uri: String,
        ) -> BoxFuture<'_, ProviderResult<OAuthTokens>> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                Ok(OAuthTokens::bearer(format!("token-for-{}", code)).with_refresh_token("rt"))
            })
        }

        fn refresh(
            &self,
            _provider: Provider,
            _refresh_token: String,
        ) -> BoxFuture<'_, ProviderResult<OAuthTokens>> {
            Box::pin(async { Ok(OAuthTokens::bearer("renewed")) })
        }
    }

    struct OpenWindow;

    impl ConsentWindow for OpenWindow {
        fn is_closed(&self) -> bool {
            false
        }
    }

    /// Simulates a callback page that posts the same success message twice
    /// from separate tasks.
    struct DoublePostLauncher;

    impl ConsentLauncher for DoublePostLauncher {
        fn launch(
            &self,
            _url: Url,
            pending: Arc<PendingAuthorization>,
        ) -> BoxFuture<'_, ProviderResult<Box<dyn ConsentWindow>>> {
            Box::pin(async move {
                let origin = pending.redirect_uri().origin();
                for _ in 0..2 {
                    let pending = Arc::clone(&pending);
                    let origin = origin.clone();
                    tokio::spawn(async move {
                        pending.deliver(
                            &origin,
                            AuthMessage::Success {
                                code: "same-code".to_string(),
                            },
                        );
                    });
                }
                Ok(Box::new(OpenWindow) as Box<dyn ConsentWindow>)
            })
        }
    }

    #[test]
    fn google_url_requests_offline_consent() {
        let config = AuthProviderConfig::google("client-1");
        let url = config.authorization_url(Service::Tasks, "st4te").unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| query.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(get("client_id"), Some("client-1"));
        assert_eq!(get("access_type"), Some("offline"));
        assert_eq!(get("prompt"), Some("consent"));
        assert_eq!(get("state"), Some("st4te"));
        assert_eq!(get("response_type"), Some("code"));
        let scope = get("scope").unwrap();
        assert!(scope.contains("https://www.googleapis.com/auth/tasks"));
        assert!(!scope.contains("auth/calendar"));
    }

    #[test]
    fn todoist_has_no_calendar() {
        let config = AuthProviderConfig::todoist("c");
        assert!(!config.supports(Service::Calendar));
        let err = config.authorization_url(Service::Calendar, "s").unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::NotImplemented);

        let url = config.authorization_url(Service::Tasks, "s").unwrap();
        assert!(url.as_str().contains("scope=data%3Aread_write"));
    }

    #[test]
    fn validate_requires_client_id() {
        assert!(AuthProviderConfig::microsoft("").validate().is_err());
        assert!(AuthProviderConfig::microsoft("id").validate().is_ok());
    }

    #[tokio::test]
    async fn duplicate_success_exchanges_once() {
        let exchange = Arc::new(CountingExchange::default());
        let provider = OAuthProvider::new(
            AuthProviderConfig::google("client"),
            exchange.clone(),
            Arc::new(DoublePostLauncher),
        );

        let tokens = provider.authenticate(Service::Calendar).await.unwrap();
        assert_eq!(tokens.access_token, "token-for-same-code");

        // Let the second delivery task run to completion
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(exchange.exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetches_user_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer at"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "1",
                "email": "ada@example.com",
                "name": "Ada",
            })))
            .mount(&server)
            .await;

        let config = AuthProviderConfig::google("c")
            .with_userinfo_url(Some(format!("{}/userinfo", server.uri())));
        let provider = OAuthProvider::new(
            config,
            Arc::new(CountingExchange::default()),
            Arc::new(DoublePostLauncher),
        );

        let profile = provider.fetch_user_profile("at".to_string()).await.unwrap();
        assert_eq!(profile.email.as_deref(), Some("ada@example.com"));
        assert_eq!(profile.name.as_deref(), Some("Ada"));
        assert!(profile.picture.is_none());
    }
}
