//! OAuth connections: persistence, consent sessions, token renewal.
//!
//! - [`connection`]: the persisted connection record
//! - [`token_store`]: one record per provider in a key-value store
//! - [`session`]: pending authorization with single-fulfilment guard
//! - [`loopback`]: system-browser consent with a loopback callback server
//! - [`exchange`]: client of the trusted code/refresh exchange service
//! - [`provider`]: per-provider configuration and the [`AuthProvider`] trait
//! - [`manager`]: the [`OAuthManager`] lifecycle policy

pub mod connection;
pub mod exchange;
pub mod loopback;
pub mod manager;
pub mod provider;
pub mod session;
pub mod token_store;

pub use connection::{ConnectionState, EXPIRY_MARGIN, OAuthConnection, OAuthTokens, UserProfile};
pub use exchange::{ExchangeConfig, HttpTokenExchange, TokenExchange};
pub use loopback::LoopbackLauncher;
pub use manager::{ConnectionStatus, OAuthManager};
pub use provider::{AuthProvider, AuthProviderConfig, OAuthProvider};
pub use session::{
    AuthMessage, AuthorizationSession, ConsentLauncher, ConsentWindow, Delivery,
    PendingAuthorization,
};
pub use token_store::TokenStore;
