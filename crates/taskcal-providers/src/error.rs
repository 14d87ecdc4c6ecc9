//! Provider error taxonomy.
//!
//! One error type covers the consent flow, the token exchange service and the
//! remote task and calendar APIs; [`ProviderErrorCode`] decides how callers
//! recover.

use std::fmt;
use thiserror::Error;

/// The category of a provider error.
///
/// Classification drives the recovery policy: transient codes are left to the
/// next batch or the next sync pass, reconnect codes drop the stored
/// connection, and `NotFound` triggers collection self-healing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// The request never got a response (connect, DNS, timeout).
    NetworkError,
    /// The access token was rejected; refresh once and retry.
    AuthExpired,
    /// The refresh token is invalid or expired; the user must reconnect.
    SessionExpired,
    /// Authentication failed for another reason (bad client, denied consent).
    AuthenticationFailed,
    /// The user closed the consent window without finishing.
    UserCancelled,
    /// The trusted exchange/refresh service could not be reached.
    ExchangeServiceUnavailable,
    /// No stored connection for the provider.
    NoConnection,
    /// No auth provider configured for the requested key.
    ProviderNotConfigured,
    /// The access token expired and no refresh token was stored.
    RefreshTokenMissing,
    /// The provider throttled the client (429 or a quota 403).
    RateLimited,
    /// The provider answered 5xx.
    ServerError,
    /// A response body could not be decoded.
    InvalidResponse,
    /// Resource not found (404); for collections this means a stale reference.
    NotFound,
    /// Any other rejected request.
    BadRequest,
    /// A payload failed validation; the item is skipped.
    ValidationError,
    /// A provider or exchange configuration value is unusable.
    ConfigurationError,
    /// Reading or writing persisted state failed.
    StorageError,
    /// Synchronization is not implemented for this provider.
    NotImplemented,
    /// Broken invariant inside this crate.
    InternalError,
}

impl ProviderErrorCode {
    /// Returns true if this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    /// Returns true if the user has to run the authorization flow again.
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::SessionExpired
                | Self::NoConnection
                | Self::RefreshTokenMissing
                | Self::AuthenticationFailed
        )
    }

    /// Returns a stable snake-case name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "network_error",
            Self::AuthExpired => "auth_expired",
            Self::SessionExpired => "session_expired",
            Self::AuthenticationFailed => "authentication_failed",
            Self::UserCancelled => "user_cancelled",
            Self::ExchangeServiceUnavailable => "exchange_service_unavailable",
            Self::NoConnection => "no_connection",
            Self::ProviderNotConfigured => "provider_not_configured",
            Self::RefreshTokenMissing => "refresh_token_missing",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ValidationError => "validation_error",
            Self::ConfigurationError => "configuration_error",
            Self::StorageError => "storage_error",
            Self::NotImplemented => "not_implemented",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error raised anywhere between the consent flow and a remote write.
#[derive(Debug, Error)]
pub struct ProviderError {
    /// Category, drives the recovery policy.
    code: ProviderErrorCode,
    /// Human-readable detail.
    message: String,
    /// Provider key (`google`, `microsoft`, `todoist`), when known.
    provider: Option<String>,
    /// Underlying cause.
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates an error with `code`.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    /// Creates an expired-access-token error.
    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthExpired, message)
    }

    /// Creates a session-expired error (reconnect required).
    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::SessionExpired, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    /// Creates a user-cancelled error.
    pub fn user_cancelled(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::UserCancelled, message)
    }

    /// Creates an exchange-service-unavailable error.
    pub fn exchange_unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ExchangeServiceUnavailable, message)
    }

    /// Creates a no-connection error.
    pub fn no_connection(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NoConnection, message)
    }

    /// Creates a provider-not-configured error.
    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ProviderNotConfigured, message)
    }

    /// Creates a refresh-token-missing error.
    pub fn refresh_token_missing(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RefreshTokenMissing, message)
    }

    /// Creates a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    /// Creates a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::BadRequest, message)
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ValidationError, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::StorageError, message)
    }

    /// Creates a not-implemented error.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotImplemented, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InternalError, message)
    }

    /// Tags the error with a provider key.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Attaches the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the provider name, if set.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Returns true if the user must reconnect the provider.
    pub fn requires_reconnect(&self) -> bool {
        self.code.requires_reconnect()
    }

    /// Returns true for a 404 on a remote resource.
    pub fn is_not_found(&self) -> bool {
        self.code == ProviderErrorCode::NotFound
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<taskcal_core::StoreError> for ProviderError {
    fn from(err: taskcal_core::StoreError) -> Self {
        ProviderError::storage(err.to_string()).with_source(err)
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_retryable() {
        assert!(ProviderErrorCode::NetworkError.is_retryable());
        assert!(ProviderErrorCode::RateLimited.is_retryable());
        assert!(ProviderErrorCode::ServerError.is_retryable());
        assert!(!ProviderErrorCode::SessionExpired.is_retryable());
        assert!(!ProviderErrorCode::NotFound.is_retryable());
    }

    #[test]
    fn reconnect_classification() {
        assert!(ProviderErrorCode::SessionExpired.requires_reconnect());
        assert!(ProviderErrorCode::RefreshTokenMissing.requires_reconnect());
        assert!(!ProviderErrorCode::ExchangeServiceUnavailable.requires_reconnect());
        assert!(!ProviderErrorCode::NetworkError.requires_reconnect());
    }

    #[test]
    fn error_code_display() {
        assert_eq!(
            ProviderErrorCode::ExchangeServiceUnavailable.as_str(),
            "exchange_service_unavailable"
        );
        assert_eq!(ProviderErrorCode::UserCancelled.to_string(), "user_cancelled");
    }

    #[test]
    fn provider_error_with_provider() {
        let err = ProviderError::network("connection timeout").with_provider("google");
        assert_eq!(err.code(), ProviderErrorCode::NetworkError);
        assert_eq!(err.provider(), Some("google"));
        assert!(err.is_retryable());
    }

    #[test]
    fn provider_error_display() {
        let err = ProviderError::session_expired("invalid_grant").with_provider("google");
        let display = format!("{}", err);
        assert_eq!(display, "[google] session_expired: invalid_grant");
    }

    #[test]
    fn provider_error_with_source() {
        use std::error::Error;
        let io_err = std::io::Error::other("disk full");
        let err = ProviderError::storage("failed to persist tokens").with_source(io_err);
        assert!(err.source().is_some());
    }
}
