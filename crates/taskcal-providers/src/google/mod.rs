//! Google Tasks and Google Calendar synchronization.
//!
//! Both services share one OAuth connection (the `google` provider) and one
//! request layer. Each gets a REST client implementing [`RemoteApi`] and a
//! mapper implementing [`EntityMapper`]; [`SyncEngine`] does the rest.
//!
//! # Example
//!
//! ```ignore
//! use taskcal_providers::google;
//!
//! let tasks = google::tasks_sync(oauth.clone(), kv.clone(), task_store);
//! let result = tasks.sync().await;
//! ```
//!
//! [`RemoteApi`]: crate::remote::RemoteApi
//! [`EntityMapper`]: crate::remote::EntityMapper

mod calendar;
mod colors;
mod event_mapper;
mod http;
mod recurrence;
mod task_mapper;
mod tasks;

use std::sync::Arc;

use taskcal_core::{EntityStore, Event, Task};

use crate::auth::OAuthManager;
use crate::engine::SyncEngine;
use crate::kv::KeyValueStore;

pub use calendar::{
    ApiEvent, ApiEventTime, ApiReminderOverride, ApiReminders, CALENDAR_API_BASE,
    DEFAULT_WINDOW_MONTHS, EVENTS_PAGE_SIZE, GoogleCalendarApi, PRIMARY_CALENDAR,
};
pub use colors::{DEFAULT_COLOR_ID, PALETTE, PaletteColor, color_id_for_hex, hex_for_color_id};
pub use event_mapper::GoogleEventMapper;
pub use http::DEFAULT_API_TIMEOUT;
pub use recurrence::{from_rrule, to_rrule};
pub use task_mapper::GoogleTaskMapper;
pub use tasks::{ApiTask, DEFAULT_TASK_LIST, GoogleTasksApi, TASKS_API_BASE};

/// Google Tasks sync provider.
pub type GoogleTasksSync = SyncEngine<GoogleTasksApi, GoogleTaskMapper>;

/// Google Calendar sync provider.
pub type GoogleCalendarSync = SyncEngine<GoogleCalendarApi, GoogleEventMapper>;

/// Builds the Google Tasks sync provider against the public API.
pub fn tasks_sync(
    oauth: Arc<OAuthManager>,
    kv: Arc<dyn KeyValueStore>,
    store: Arc<dyn EntityStore<Task>>,
) -> GoogleTasksSync {
    SyncEngine::new(GoogleTasksApi::default(), GoogleTaskMapper, oauth, kv, store)
}

/// Builds the Google Calendar sync provider against the public API.
pub fn calendar_sync(
    oauth: Arc<OAuthManager>,
    kv: Arc<dyn KeyValueStore>,
    store: Arc<dyn EntityStore<Event>>,
) -> GoogleCalendarSync {
    SyncEngine::new(GoogleCalendarApi::default(), GoogleEventMapper, oauth, kv, store)
}
