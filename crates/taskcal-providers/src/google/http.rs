//! Shared request plumbing for the Google REST APIs.
//!
//! Every call carries the access token as a bearer credential. Responses are
//! classified into [`ProviderError`] codes the sync engine knows how to
//! recover from: 401 asks for a token refresh, 404/410 flags a stale
//! reference, quota errors become rate limits.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};

/// Default request timeout for Google API calls.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// A bearer-authenticated JSON client bound to one API base URL.
#[derive(Debug, Clone)]
pub(crate) struct GoogleHttp {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleHttp {
    pub(crate) fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, token: &str, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
    }

    /// GETs `path` with query parameters and decodes the JSON body.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> ProviderResult<T> {
        let response = send(self.request(Method::GET, token, path).query(query)).await?;
        parse(response).await
    }

    /// Sends a JSON body with `method` and decodes the JSON reply.
    pub(crate) async fn send_json<B, T>(
        &self,
        method: Method,
        token: &str,
        path: &str,
        body: &B,
    ) -> ProviderResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = send(self.request(method, token, path).json(body)).await?;
        parse(response).await
    }

    /// DELETEs `path`, ignoring the (empty) body.
    pub(crate) async fn delete(&self, token: &str, path: &str) -> ProviderResult<()> {
        send(self.request(Method::DELETE, token, path)).await?;
        Ok(())
    }
}

/// Percent-encodes one path segment.
pub(crate) fn segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

async fn send(request: RequestBuilder) -> ProviderResult<Response> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::network("request timeout").with_source(e)
        } else if e.is_connect() {
            ProviderError::network(format!("connection failed: {}", e)).with_source(e)
        } else {
            ProviderError::network(format!("request failed: {}", e)).with_source(e)
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    let err = classify(status, &body, retry_after);
    debug!(%status, code = %err.code(), "google API call failed");
    Err(err)
}

async fn parse<T: DeserializeOwned>(response: Response) -> ProviderResult<T> {
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;
    serde_json::from_str(&body).map_err(|e| {
        warn!("unexpected Google API payload: {}", e);
        ProviderError::invalid_response(format!("failed to parse response: {}", e)).with_source(e)
    })
}

/// Decodes the elements of a listing one by one.
///
/// An element that does not match `T` is left out and reported as a
/// validation message naming its id, so one bad item never costs the page.
pub(crate) fn decode_items<T: DeserializeOwned>(items: Vec<Value>) -> (Vec<T>, Vec<String>) {
    let mut decoded = Vec::with_capacity(items.len());
    let mut invalid = Vec::new();
    for item in items {
        let id = item["id"].as_str().unwrap_or("<no id>").to_string();
        match serde_json::from_value(item) {
            Ok(value) => decoded.push(value),
            Err(e) => {
                warn!(%id, "skipping undecodable item: {}", e);
                invalid.push(format!(
                    "{}: {}",
                    id,
                    ProviderError::validation(format!("unexpected item shape: {}", e))
                ));
            }
        }
    }
    (decoded, invalid)
}

/// Maps an unsuccessful status and its body to an error.
pub(crate) fn classify(status: StatusCode, body: &str, retry_after: Option<u64>) -> ProviderError {
    let (message, reason) = error_details(body);
    let message = message.unwrap_or_else(|| format!("HTTP {}", status));

    match status {
        StatusCode::UNAUTHORIZED => ProviderError::auth_expired(message),
        StatusCode::FORBIDDEN
            if matches!(
                reason.as_deref(),
                Some("rateLimitExceeded" | "userRateLimitExceeded" | "quotaExceeded")
            ) =>
        {
            ProviderError::rate_limited(message)
        }
        StatusCode::FORBIDDEN => ProviderError::authentication(format!("access denied: {}", message)),
        StatusCode::NOT_FOUND | StatusCode::GONE => ProviderError::not_found(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(format!(
            "{}{}",
            message,
            retry_after
                .map(|s| format!(", retry after {} seconds", s))
                .unwrap_or_default()
        )),
        StatusCode::BAD_REQUEST => ProviderError::validation(message),
        s if s.is_server_error() => ProviderError::server(format!("API error ({}): {}", s, message)),
        s => ProviderError::bad_request(format!("API error ({}): {}", s, message)),
    }
}

/// Extracts `error.message` and the first `error.errors[].reason`.
fn error_details(body: &str) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return (None, None);
    };
    let error = &value["error"];
    let message = error["message"].as_str().map(str::to_string);
    let reason = error["errors"][0]["reason"].as_str().map(str::to_string);
    (message, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Item {
        id: String,
        size: u32,
    }

    #[test]
    fn undecodable_items_are_reported_individually() {
        let items = vec![
            serde_json::json!({"id": "a", "size": 1}),
            serde_json::json!({"id": "b", "size": "large"}),
            serde_json::json!({"size": 3}),
            serde_json::json!({"id": "d", "size": 4}),
        ];
        let (decoded, invalid): (Vec<Item>, _) = decode_items(items);
        let ids: Vec<_> = decoded.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["a", "d"]);
        assert_eq!(decoded[1].size, 4);
        assert_eq!(invalid.len(), 2);
        assert!(invalid[0].starts_with("b: validation_error"));
        assert!(invalid[1].starts_with("<no id>: "));
    }
    use crate::error::ProviderErrorCode;

    fn code(status: u16, body: &str) -> ProviderErrorCode {
        classify(StatusCode::from_u16(status).unwrap(), body, None).code()
    }

    #[test]
    fn status_classification() {
        assert_eq!(code(401, ""), ProviderErrorCode::AuthExpired);
        assert_eq!(code(403, ""), ProviderErrorCode::AuthenticationFailed);
        assert_eq!(code(404, ""), ProviderErrorCode::NotFound);
        assert_eq!(code(410, ""), ProviderErrorCode::NotFound);
        assert_eq!(code(429, ""), ProviderErrorCode::RateLimited);
        assert_eq!(code(400, ""), ProviderErrorCode::ValidationError);
        assert_eq!(code(503, ""), ProviderErrorCode::ServerError);
        assert_eq!(code(409, ""), ProviderErrorCode::BadRequest);
    }

    #[test]
    fn quota_forbidden_is_rate_limit() {
        let body = r#"{"error":{"code":403,"message":"Rate Limit Exceeded",
            "errors":[{"reason":"rateLimitExceeded"}]}}"#;
        let err = classify(StatusCode::FORBIDDEN, body, None);
        assert_eq!(err.code(), ProviderErrorCode::RateLimited);
        assert_eq!(err.message(), "Rate Limit Exceeded");
    }

    #[test]
    fn retry_after_in_message() {
        let err = classify(StatusCode::TOO_MANY_REQUESTS, "", Some(7));
        assert!(err.message().ends_with("retry after 7 seconds"));
    }

    #[test]
    fn segments_are_encoded() {
        assert_eq!(segment("team@group.calendar.google.com"), "team%40group.calendar.google.com");
        assert_eq!(segment("L1"), "L1");
    }
}
