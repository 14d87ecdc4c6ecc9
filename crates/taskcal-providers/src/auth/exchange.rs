//! Client of the trusted token exchange service.
//!
//! The client secret never leaves the exchange service. This side only posts
//! authorization codes and refresh tokens to it:
//!
//! - `POST {base}/api/oauth/exchange` with `{code, provider, redirect_uri}`
//! - `POST {base}/api/oauth/refresh` with `{provider, refresh_token}`
//!
//! Both answer with a standard OAuth token response. Failures are classified
//! so callers can tell "the helper service is down" apart from "the user
//! must log in again".

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use taskcal_core::Provider;
use tracing::{debug, info, warn};
use url::Url;

use super::connection::OAuthTokens;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

/// Default base URL of the exchange service.
pub const DEFAULT_EXCHANGE_URL: &str = "http://127.0.0.1:8787";

/// Default request timeout.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Performs code exchange and token renewal on behalf of the client.
pub trait TokenExchange: Send + Sync {
    /// Exchanges an authorization code for tokens.
    fn exchange(
        &self,
        provider: Provider,
        code: String,
        redirect_uri: String,
    ) -> BoxFuture<'_, ProviderResult<OAuthTokens>>;

    /// Renews tokens with a refresh token.
    fn refresh(
        &self,
        provider: Provider,
        refresh_token: String,
    ) -> BoxFuture<'_, ProviderResult<OAuthTokens>>;
}

/// Location and timeout of the exchange service.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Base URL; endpoint paths are appended to it.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ExchangeConfig {
    /// Creates a config for the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }

    /// Checks that the base URL is an absolute http(s) URL.
    pub fn validate(&self) -> ProviderResult<Url> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            ProviderError::configuration(format!(
                "invalid exchange URL '{}': {}",
                self.base_url, e
            ))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ProviderError::configuration(format!(
                "exchange URL must use http or https, got '{}'",
                other
            ))),
        }
    }

    /// Builder method to set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_EXCHANGE_URL)
    }
}

#[derive(Debug, Serialize)]
struct ExchangeBody<'a> {
    code: &'a str,
    provider: Provider,
    redirect_uri: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshBody<'a> {
    provider: Provider,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_tokens(self) -> OAuthTokens {
        OAuthTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: self.scope,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Exchange,
    Refresh,
}

impl Endpoint {
    fn path(self) -> &'static str {
        match self {
            Self::Exchange => "api/oauth/exchange",
            Self::Refresh => "api/oauth/refresh",
        }
    }
}

/// HTTP implementation of [`TokenExchange`].
#[derive(Debug, Clone)]
pub struct HttpTokenExchange {
    config: ExchangeConfig,
    http_client: reqwest::Client,
}

impl HttpTokenExchange {
    /// Creates a client for the configured exchange service.
    pub fn new(config: ExchangeConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to create HTTP client");

        Self {
            config,
            http_client,
        }
    }

    fn endpoint_url(&self, endpoint: Endpoint) -> ProviderResult<Url> {
        let mut base = self.config.validate()?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(endpoint.path())
            .map_err(|e| ProviderError::configuration(format!("invalid exchange URL: {}", e)))
    }

    async fn post<B: Serialize>(
        &self,
        provider: Provider,
        endpoint: Endpoint,
        body: &B,
    ) -> ProviderResult<OAuthTokens> {
        let url = self.endpoint_url(endpoint)?;
        debug!(%provider, %url, "calling token exchange service");

        let response = self
            .http_client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_connect() {
                    format!("token exchange service unreachable: {}", e)
                } else if e.is_timeout() {
                    "token exchange service timed out".to_string()
                } else {
                    format!("token exchange request failed: {}", e)
                };
                ProviderError::exchange_unavailable(message)
                    .with_provider(provider.as_str())
                    .with_source(e)
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read response: {}", e))
                .with_provider(provider.as_str())
        })?;

        if !status.is_success() {
            let err = classify_failure(endpoint, status, &text).with_provider(provider.as_str());
            warn!(%provider, %status, "token exchange service rejected request");
            return Err(err);
        }

        let token_response: TokenResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {}", e))
                .with_provider(provider.as_str())
        })?;

        Ok(token_response.into_tokens())
    }
}

impl TokenExchange for HttpTokenExchange {
    fn exchange(
        &self,
        provider: Provider,
        code: String,
        redirect_uri: String,
    ) -> BoxFuture<'_, ProviderResult<OAuthTokens>> {
        Box::pin(async move {
            let body = ExchangeBody {
                code: &code,
                provider,
                redirect_uri: &redirect_uri,
            };
            let tokens = self.post(provider, Endpoint::Exchange, &body).await?;
            info!(%provider, "exchanged authorization code for tokens");
            Ok(tokens)
        })
    }

    fn refresh(
        &self,
        provider: Provider,
        refresh_token: String,
    ) -> BoxFuture<'_, ProviderResult<OAuthTokens>> {
        Box::pin(async move {
            let body = RefreshBody {
                provider,
                refresh_token: &refresh_token,
            };
            let tokens = self.post(provider, Endpoint::Refresh, &body).await?;
            info!(%provider, "refreshed access token");
            Ok(tokens)
        })
    }
}

/// Maps a non-success response of the exchange service to an error.
fn classify_failure(endpoint: Endpoint, status: reqwest::StatusCode, body: &str) -> ProviderError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let detail = parsed
        .error_description
        .clone()
        .or_else(|| parsed.error.clone())
        .unwrap_or_else(|| body.to_string());
    let invalid_grant = parsed.error.as_deref() == Some("invalid_grant");
    let rejected = matches!(status.as_u16(), 400 | 401);
    let reconnect_hint = !status.is_server_error()
        && [parsed.error.as_deref(), parsed.error_description.as_deref()]
            .into_iter()
            .flatten()
            .map(str::to_ascii_lowercase)
            .any(|text| text.contains("expired") || text.contains("reconnect"));

    match endpoint {
        Endpoint::Refresh if invalid_grant || rejected || reconnect_hint => {
            ProviderError::session_expired(format!(
                "refresh rejected ({}): {}; reconnect required",
                status, detail
            ))
        }
        Endpoint::Exchange if invalid_grant || rejected => ProviderError::authentication(
            format!("code exchange rejected ({}): {}", status, detail),
        ),
        _ if status.is_server_error() => {
            ProviderError::server(format!("token exchange service error ({}): {}", status, detail))
        }
        _ => ProviderError::authentication(format!(
            "token exchange failed ({}): {}",
            status, detail
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpTokenExchange {
        HttpTokenExchange::new(ExchangeConfig::new(server.uri()))
    }

    #[tokio::test]
    async fn exchange_posts_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth/exchange"))
            .and(body_json(serde_json::json!({
                "code": "c0de",
                "provider": "google",
                "redirect_uri": "http://127.0.0.1:8976/callback",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 3600,
                "token_type": "Bearer",
                "scope": "https://www.googleapis.com/auth/tasks",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = client_for(&server)
            .exchange(
                Provider::Google,
                "c0de".to_string(),
                "http://127.0.0.1:8976/callback".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt"));
        let expires_at = tokens.expires_at.unwrap();
        assert!(expires_at > Utc::now() + chrono::Duration::minutes(59));
    }

    #[tokio::test]
    async fn refresh_invalid_grant_is_session_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth/refresh"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked.",
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .refresh(Provider::Google, "old".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::SessionExpired);
        assert!(err.requires_reconnect());
    }

    #[tokio::test]
    async fn refresh_reconnect_hint_is_session_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth/refresh"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": "token_expired",
                "error_description": "Refresh token is no longer valid, please reconnect",
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .refresh(Provider::Microsoft, "old".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::SessionExpired);
    }

    #[tokio::test]
    async fn refresh_forbidden_without_hint_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth/refresh"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": "unauthorized_client",
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .refresh(Provider::Google, "old".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
    }

    #[tokio::test]
    async fn refresh_unauthorized_is_session_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth/refresh"))
            .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .refresh(Provider::Microsoft, "old".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::SessionExpired);
    }

    #[tokio::test]
    async fn refresh_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth/refresh"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .refresh(Provider::Google, "rt".to_string())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(!err.requires_reconnect());
    }

    #[tokio::test]
    async fn unreachable_service_is_distinct() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ExchangeConfig::new(format!("http://127.0.0.1:{}", port));
        let err = HttpTokenExchange::new(config)
            .refresh(Provider::Google, "rt".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ExchangeServiceUnavailable);
        assert!(!err.requires_reconnect());
    }

    #[test]
    fn endpoint_url_keeps_base_path() {
        let config = ExchangeConfig::new("http://localhost:9000/helper");
        let client = HttpTokenExchange::new(config);
        let url = client.endpoint_url(Endpoint::Refresh).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/helper/api/oauth/refresh");
    }

    #[test]
    fn validate_rejects_bad_urls() {
        assert!(ExchangeConfig::default().validate().is_ok());
        assert!(ExchangeConfig::new("not a url").validate().is_err());
        assert!(ExchangeConfig::new("ftp://host/").validate().is_err());
    }
}
