//! Sync orchestration error types.

use thiserror::Error;

/// Result type for orchestration operations.
pub type ManagerResult<T> = Result<T, SyncError>;

/// Errors raised by the manager and scheduler.
///
/// Provider failures never show up here; they are folded into each
/// provider's `SyncResult`.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No registered provider has this name.
    #[error("unknown sync provider: {name}")]
    UnknownProvider { name: String },

    /// A provider with this name is already registered.
    #[error("sync provider already registered: {name}")]
    DuplicateProvider { name: String },

    /// The scheduler loop has exited.
    #[error("scheduler is not running")]
    SchedulerStopped,
}

impl SyncError {
    /// Creates an unknown provider error.
    pub fn unknown_provider(name: impl Into<String>) -> Self {
        Self::UnknownProvider { name: name.into() }
    }
}
