//! Provider connectivity and synchronization.
//!
//! This crate keeps local tasks and events in step with remote providers:
//!
//! - [`auth`] - OAuth connections, consent sessions and token renewal
//! - [`ListMapper`] - persisted local name to remote collection id mapping
//! - [`BatchExecutor`] - paced, bounded-concurrency remote writes
//! - [`SyncEngine`] - push/pull over a [`RemoteApi`] and an [`EntityMapper`]
//! - [`SyncProvider`] - the per-provider sync contract
//! - [`ProviderError`] - error taxonomy shared by all of the above
//!
//! # Architecture
//!
//! ```text
//!             ┌──────────────┐
//!             │ OAuthManager │◄──── TokenStore ◄── KeyValueStore
//!             └──────┬───────┘
//!                    │ access token
//!                    ▼
//! ┌────────────┐  ┌────────────┐  ┌───────────────┐
//! │ ListMapper │─►│ SyncEngine │◄─│ BatchExecutor │
//! └────────────┘  └─────┬──────┘  └───────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//! ┌─────────────────┐      ┌──────────────────┐
//! │ GoogleTasksApi  │      │ GoogleCalendarApi│
//! │ GoogleTaskMapper│      │ GoogleEventMapper│
//! └─────────────────┘      └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use taskcal_providers::{SyncProvider, google};
//!
//! let provider = google::tasks_sync(oauth, kv, store);
//! let result = provider.sync().await;
//! println!("synced {} items", result.synced_count);
//! ```

pub mod auth;
pub mod batch;
pub mod engine;
pub mod error;
#[cfg(feature = "google")]
pub mod google;
pub mod kv;
pub mod lists;
pub mod provider;
pub mod remote;

// Re-export main types at crate root
pub use auth::{OAuthConnection, OAuthManager, OAuthTokens, TokenStore};
pub use batch::{BatchConfig, BatchExecutor, BatchItemResult, BatchOperation, Operation};
pub use engine::{PullReport, PushReport, SyncEngine, SyncSettings};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use lists::{CollectionApi, ListMapper, RemoteCollection};
pub use provider::{BoxFuture, SyncProvider, UnsupportedSyncProvider};
pub use remote::{EntityMapper, Page, RemoteApi};
