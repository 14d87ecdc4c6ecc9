//! Sync orchestration: run every configured provider and schedule passes.
//!
//! - [`SyncManager`] runs the enabled providers one after the other and
//!   isolates their failures from each other
//! - [`SyncScheduler`] repeats passes on an interval with jitter and backs off
//!   while every provider keeps failing
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taskcal_sync::{SchedulerConfig, SyncManager, SyncScheduler};
//!
//! let manager = SyncManager::new()
//!     .with_provider(Arc::new(google::tasks_sync(oauth, kv, store)))?;
//! let summary = manager.sync_all().await;
//! println!("synced {}", summary.total().synced_count);
//!
//! let scheduler = SyncScheduler::new(SchedulerConfig::default(), Arc::new(manager));
//! let handle = scheduler.handle();
//! tokio::spawn(scheduler.run());
//! handle.sync_now().await?;
//! ```

mod error;
mod manager;
mod scheduler;

pub use error::{ManagerResult, SyncError};
pub use manager::{ProviderOutcome, SyncManager, SyncSummary};
pub use scheduler::{
    SchedulerCommand, SchedulerConfig, SchedulerHandle, SchedulerState, SyncScheduler,
};
