//! Consent in the system browser with a loopback callback server.
//!
//! The authorization URL is opened in the user's browser. The provider
//! redirects back to `http://127.0.0.1:<port>/callback`, where a small tokio
//! server turns the query string into an [`AuthMessage`] and delivers it to
//! the pending session. The "window" counts as closed when the server stops
//! without having delivered a terminal message.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use super::session::{AuthMessage, ConsentLauncher, ConsentWindow, Delivery, PendingAuthorization};
use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

const SUCCESS_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Authorization Successful</h1>\
    <p>You can close this window and return to taskcal.</p></body></html>";

const FAILURE_PAGE: &str = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Authorization Failed</h1>\
    <p>You can close this window.</p></body></html>";

const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\nConnection: close\r\n\r\n";

/// Opens the consent page in the default browser and listens on the
/// redirect URI's loopback port.
#[derive(Debug, Clone, Default)]
pub struct LoopbackLauncher {
    open_browser: bool,
}

impl LoopbackLauncher {
    /// Creates a launcher that opens the system browser.
    pub fn new() -> Self {
        Self { open_browser: true }
    }

    /// Creates a launcher that only prints the URL.
    pub fn headless() -> Self {
        Self {
            open_browser: false,
        }
    }
}

impl ConsentLauncher for LoopbackLauncher {
    fn launch(
        &self,
        url: Url,
        pending: Arc<PendingAuthorization>,
    ) -> BoxFuture<'_, ProviderResult<Box<dyn ConsentWindow>>> {
        Box::pin(async move {
            let redirect = pending.redirect_uri().clone();
            let host = redirect.host_str().unwrap_or("127.0.0.1").to_string();
            let port = redirect.port_or_known_default().ok_or_else(|| {
                ProviderError::configuration(format!("redirect URI {} has no port", redirect))
            })?;

            let listener = TcpListener::bind((host.as_str(), port)).await.map_err(|e| {
                ProviderError::configuration(format!(
                    "cannot listen on {}:{} for the OAuth callback: {}",
                    host, port, e
                ))
                .with_source(e)
            })?;
            debug!("callback server listening on {}:{}", host, port);

            let task = tokio::spawn(serve_callback(listener, Arc::clone(&pending)));

            info!("opening browser for authorization");
            if !self.open_browser {
                eprintln!("\nOpen this URL in your browser:\n\n{}\n", url);
            } else if let Err(e) = open::that(url.as_str()) {
                warn!("failed to open browser: {}", e);
                eprintln!("\nPlease open this URL in your browser:\n\n{}\n", url);
            }

            Ok(Box::new(LoopbackWindow { task, pending }) as Box<dyn ConsentWindow>)
        })
    }
}

struct LoopbackWindow {
    task: JoinHandle<()>,
    pending: Arc<PendingAuthorization>,
}

impl ConsentWindow for LoopbackWindow {
    fn is_closed(&self) -> bool {
        self.task.is_finished() && !self.pending.is_fulfilled()
    }
}

impl Drop for LoopbackWindow {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_callback(listener: TcpListener, pending: Arc<PendingAuthorization>) {
    let origin = pending.redirect_uri().origin();
    let callback_path = pending.redirect_uri().path().to_string();

    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!("callback server stopped: {}", e);
                return;
            }
        };

        let Some(message) = handle_connection(stream, &callback_path, pending.state()).await
        else {
            continue;
        };

        match pending.deliver(&origin, message) {
            Delivery::Accepted | Delivery::AlreadyFulfilled => return,
            Delivery::WrongOrigin => continue,
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    callback_path: &str,
    expected_state: &str,
) -> Option<AuthMessage> {
    let mut request_line = String::new();
    {
        let mut reader = BufReader::new(&mut stream);
        if reader.read_line(&mut request_line).await.is_err() {
            return None;
        }
    }

    // GET /callback?code=...&state=... HTTP/1.1
    let mut parts = request_line.split_whitespace();
    let (Some("GET"), Some(target)) = (parts.next(), parts.next()) else {
        let _ = stream.write_all(NOT_FOUND.as_bytes()).await;
        return None;
    };

    let message = Url::parse(&format!("http://localhost{}", target))
        .ok()
        .filter(|u| u.path() == callback_path)
        .map(|u| parse_callback(&u, expected_state));

    let page = match &message {
        Some(AuthMessage::Success { .. }) => SUCCESS_PAGE,
        Some(AuthMessage::Error { .. }) => FAILURE_PAGE,
        None => NOT_FOUND,
    };
    let _ = stream.write_all(page.as_bytes()).await;
    let _ = stream.flush().await;

    message
}

/// Converts the callback query into a terminal message.
pub(crate) fn parse_callback(url: &Url, expected_state: &str) -> AuthMessage {
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return AuthMessage::Error {
            error,
            error_description: description,
        };
    }

    if state.as_deref() != Some(expected_state) {
        return AuthMessage::Error {
            error: "state_mismatch".to_string(),
            error_description: Some("OAuth state mismatch, possible CSRF attempt".to_string()),
        };
    }

    match code {
        Some(code) => AuthMessage::Success { code },
        None => AuthMessage::Error {
            error: "missing_code".to_string(),
            error_description: Some("callback carried no authorization code".to_string()),
        },
    }
}
