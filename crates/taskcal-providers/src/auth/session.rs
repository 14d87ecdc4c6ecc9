//! Interactive authorization sessions.
//!
//! A consent window (browser tab, popup, embedded view) eventually reports one
//! of two terminal messages back to the opener: success with an authorization
//! code, or an error. [`AuthorizationSession`] models the opener side as a
//! pending request with three guards that are retired together:
//!
//! - a single-fulfilment guard, so a message delivered twice for the same
//!   session only ever completes it once;
//! - a liveness poll that notices the window being closed without a message;
//! - a wall-clock timeout.
//!
//! Messages whose origin differs from the redirect URI's origin are ignored.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::{Origin, Url};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

/// How often the consent window is checked for having been closed.
pub const WINDOW_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long the user has to finish the consent flow.
pub const AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Length in bytes of the random CSRF state, before encoding.
const STATE_LENGTH: usize = 16;

/// A message posted by the consent window's callback page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthMessage {
    /// The user granted consent.
    #[serde(rename = "OAUTH_SUCCESS")]
    Success {
        /// The authorization code.
        code: String,
    },
    /// The provider reported an error.
    #[serde(rename = "OAUTH_ERROR", rename_all = "camelCase")]
    Error {
        /// Error code, e.g. `access_denied`.
        error: String,
        /// Human-readable description.
        #[serde(default)]
        error_description: Option<String>,
    },
}

/// Outcome of delivering a message to a pending session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The message completed the session.
    Accepted,
    /// The sender's origin does not match.
    WrongOrigin,
    /// The session was already completed or retired.
    AlreadyFulfilled,
}

/// A window showing the provider's consent page.
pub trait ConsentWindow: Send + Sync {
    /// Returns true once the window is gone without the session completing.
    fn is_closed(&self) -> bool;
}

/// Opens consent windows.
pub trait ConsentLauncher: Send + Sync {
    /// Opens `url` and arranges for the callback page to deliver its terminal
    /// message to `pending`.
    fn launch(
        &self,
        url: Url,
        pending: Arc<PendingAuthorization>,
    ) -> BoxFuture<'_, ProviderResult<Box<dyn ConsentWindow>>>;
}

/// The listening side of an authorization session.
///
/// Shared with whatever receives callback messages; delivery is safe from any
/// task.
#[derive(Debug)]
pub struct PendingAuthorization {
    expected_origin: Origin,
    redirect_uri: Url,
    state: String,
    fulfilled: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<AuthMessage>>>,
}

impl PendingAuthorization {
    /// Returns the redirect URI the provider sends the user back to.
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Returns the CSRF state carried through the provider round-trip.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Returns true once a terminal message has been accepted or the session
    /// was retired.
    pub fn is_fulfilled(&self) -> bool {
        self.fulfilled.load(Ordering::SeqCst)
    }

    /// Delivers a message sent from `origin`.
    pub fn deliver(&self, origin: &Origin, message: AuthMessage) -> Delivery {
        if *origin != self.expected_origin {
            warn!(
                origin = %origin.ascii_serialization(),
                "ignoring authorization message from foreign origin"
            );
            return Delivery::WrongOrigin;
        }

        if self.fulfilled.swap(true, Ordering::SeqCst) {
            debug!("ignoring duplicate authorization message");
            return Delivery::AlreadyFulfilled;
        }

        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(message);
        }
        Delivery::Accepted
    }

    fn retire(&self) {
        self.fulfilled.store(true, Ordering::SeqCst);
        self.sender.lock().take();
    }
}

/// An in-flight authorization request awaiting its terminal message.
#[derive(Debug)]
pub struct AuthorizationSession {
    pending: Arc<PendingAuthorization>,
    receiver: oneshot::Receiver<AuthMessage>,
    poll_interval: Duration,
    timeout: Duration,
}

impl AuthorizationSession {
    /// Creates a session for the given redirect URI with a fresh random state.
    pub fn new(redirect_uri: Url) -> Self {
        Self::with_state(redirect_uri, generate_state())
    }

    /// Creates a session with an explicit state value.
    pub fn with_state(redirect_uri: Url, state: impl Into<String>) -> Self {
        let (sender, receiver) = oneshot::channel();
        let pending = PendingAuthorization {
            expected_origin: redirect_uri.origin(),
            redirect_uri,
            state: state.into(),
            fulfilled: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
        };
        Self {
            pending: Arc::new(pending),
            receiver,
            poll_interval: WINDOW_POLL_INTERVAL,
            timeout: AUTHORIZATION_TIMEOUT,
        }
    }

    /// Builder method to override the poll interval and timeout.
    pub fn with_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }

    /// Returns the listening side, to be handed to the consent window.
    pub fn pending(&self) -> Arc<PendingAuthorization> {
        Arc::clone(&self.pending)
    }

    /// Waits for the terminal message and returns the authorization code.
    ///
    /// # Errors
    ///
    /// - `UserCancelled` if the window closes without a message
    /// - `AuthExpired` if nothing arrives before the timeout
    /// - `AuthenticationFailed` if the provider reported an error
    pub async fn wait(self, window: &dyn ConsentWindow) -> ProviderResult<String> {
        let Self {
            pending,
            mut receiver,
            poll_interval,
            timeout,
        } = self;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut poll = tokio::time::interval(poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                message = &mut receiver => {
                    break match message {
                        Ok(message) => Ok(message),
                        Err(_) => Err(ProviderError::internal("authorization listener dropped")),
                    };
                }
                _ = poll.tick() => {
                    if window.is_closed() && !pending.is_fulfilled() {
                        info!("consent window closed before completing");
                        break Err(ProviderError::user_cancelled(
                            "authorization window was closed",
                        ));
                    }
                }
                _ = &mut deadline => {
                    warn!("authorization timed out after {:?}", timeout);
                    break Err(ProviderError::auth_expired("authorization timed out"));
                }
            }
        };

        // Retire every guard regardless of which one fired
        pending.retire();

        match outcome? {
            AuthMessage::Success { code } => Ok(code),
            AuthMessage::Error {
                error,
                error_description,
            } => {
                let detail = error_description.unwrap_or_default();
                if error == "access_denied" {
                    Err(ProviderError::user_cancelled(format!(
                        "consent denied: {}",
                        detail
                    )))
                } else {
                    Err(ProviderError::authentication(format!(
                        "authorization failed: {} {}",
                        error, detail
                    )))
                }
            }
        }
    }
}

/// Generates a random URL-safe state string for CSRF protection.
pub fn generate_state() -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..STATE_LENGTH).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;

    struct FakeWindow {
        closed: AtomicBool,
    }

    impl FakeWindow {
        fn open() -> Self {
            Self {
                closed: AtomicBool::new(false),
            }
        }
    }

    impl ConsentWindow for FakeWindow {
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    fn redirect() -> Url {
        Url::parse("http://127.0.0.1:8976/callback").unwrap()
    }

    fn success(code: &str) -> AuthMessage {
        AuthMessage::Success {
            code: code.to_string(),
        }
    }

    #[tokio::test]
    async fn success_message_yields_code() {
        let session = AuthorizationSession::new(redirect());
        let pending = session.pending();
        let origin = redirect().origin();
        assert_eq!(pending.deliver(&origin, success("abc")), Delivery::Accepted);

        let code = session.wait(&FakeWindow::open()).await.unwrap();
        assert_eq!(code, "abc");
    }

    #[tokio::test]
    async fn duplicate_message_is_rejected() {
        let session = AuthorizationSession::new(redirect());
        let pending = session.pending();
        let origin = redirect().origin();

        assert_eq!(pending.deliver(&origin, success("abc")), Delivery::Accepted);
        assert_eq!(
            pending.deliver(&origin, success("abc")),
            Delivery::AlreadyFulfilled
        );
        assert!(session.wait(&FakeWindow::open()).await.is_ok());
    }

    #[tokio::test]
    async fn foreign_origin_is_ignored() {
        let session = AuthorizationSession::new(redirect())
            .with_timing(Duration::from_millis(10), Duration::from_millis(50));
        let pending = session.pending();
        let evil = Url::parse("https://evil.example").unwrap().origin();

        assert_eq!(pending.deliver(&evil, success("x")), Delivery::WrongOrigin);
        assert!(!pending.is_fulfilled());

        let err = session.wait(&FakeWindow::open()).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthExpired);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_window_cancels() {
        let session = AuthorizationSession::new(redirect());
        let pending = session.pending();
        let window = FakeWindow::open();
        window.closed.store(true, Ordering::SeqCst);

        let err = session.wait(&window).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::UserCancelled);
        // Guards are retired; late messages no longer land
        assert_eq!(
            pending.deliver(&redirect().origin(), success("late")),
            Delivery::AlreadyFulfilled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_five_minutes() {
        let session = AuthorizationSession::new(redirect());
        let started = tokio::time::Instant::now();
        let err = session.wait(&FakeWindow::open()).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthExpired);
        assert!(started.elapsed() >= AUTHORIZATION_TIMEOUT);
    }

    #[tokio::test]
    async fn error_message_fails_authentication() {
        let session = AuthorizationSession::new(redirect());
        session.pending().deliver(
            &redirect().origin(),
            AuthMessage::Error {
                error: "invalid_scope".to_string(),
                error_description: Some("bad scope".to_string()),
            },
        );
        let err = session.wait(&FakeWindow::open()).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
        assert!(err.message().contains("bad scope"));
    }

    #[test]
    fn message_wire_shape() {
        let json = serde_json::to_value(AuthMessage::Error {
            error: "access_denied".to_string(),
            error_description: None,
        })
        .unwrap();
        assert_eq!(json["type"], "OAUTH_ERROR");
        assert_eq!(json["error"], "access_denied");

        let parsed: AuthMessage =
            serde_json::from_str(r#"{"type":"OAUTH_SUCCESS","code":"4/abc"}"#).unwrap();
        assert_eq!(parsed, success("4/abc"));
    }

    #[test]
    fn state_is_random() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        // 16 bytes base64url without padding
        assert_eq!(a.len(), 22);
    }
}
