//! Client error types.

use taskcal_core::StoreError;
use taskcal_providers::ProviderError;
use taskcal_sync::SyncError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Provider error.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Local entity store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Orchestration error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The provider has no usable connection.
    #[error("authentication required: {0}")]
    AuthRequired(String),

    /// Every provider of a sync pass failed.
    #[error("sync failed: {0}")]
    SyncFailed(String),
}

impl ClientError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
