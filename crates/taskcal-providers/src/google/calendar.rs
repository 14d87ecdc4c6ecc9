//! Google Calendar API v3 client.
//!
//! Event listings are bounded to a window around now and request server-side
//! expansion of recurring events, so each page holds concrete instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskcal_core::{Provider, Service, TimeWindow};
use tracing::{debug, warn};

use super::http::{DEFAULT_API_TIMEOUT, GoogleHttp, decode_items, segment};
use crate::error::{ProviderError, ProviderResult};
use crate::lists::{CollectionApi, RemoteCollection};
use crate::provider::BoxFuture;
use crate::remote::{Page, RemoteApi};

/// Base URL for Google Calendar API v3.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Id of the account's primary calendar.
pub const PRIMARY_CALENDAR: &str = "primary";

/// Maximum events per listing page.
pub const EVENTS_PAGE_SIZE: usize = 2500;

/// Months listed before and after now.
pub const DEFAULT_WINDOW_MONTHS: u32 = 3;

/// Start or end of an event on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEventTime {
    /// RFC 3339 timestamp for timed events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    /// `YYYY-MM-DD` for all-day events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// IANA zone name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// One reminder override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiReminderOverride {
    /// `popup` or `email`.
    pub method: String,
    /// Minutes before start.
    pub minutes: u32,
}

/// Reminder settings of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReminders {
    /// Whether the calendar's default reminders apply.
    #[serde(default)]
    pub use_default: bool,
    /// Explicit reminders.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<ApiReminderOverride>,
}

/// An event as exchanged with Google.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    /// Remote id (absent on create).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<ApiEventTime>,
    /// End.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<ApiEventTime>,
    /// `RRULE`/`EXDATE` lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Vec<String>>,
    /// Id of the recurring event this instance belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring_event_id: Option<String>,
    /// Palette id, `"1"` to `"11"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    /// Reminder settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminders: Option<ApiReminders>,
    /// `confirmed`, `tentative` or `cancelled`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Last modification, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<Value>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CalendarListEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsResponse {
    #[serde(default)]
    items: Vec<Value>,
    next_page_token: Option<String>,
}

/// Google Calendar API client.
#[derive(Debug, Clone)]
pub struct GoogleCalendarApi {
    http: GoogleHttp,
    window_back: u32,
    window_forward: u32,
    /// Window of the listing each outstanding page token continues.
    cursor_windows: Arc<Mutex<HashMap<String, TimeWindow>>>,
}

impl Default for GoogleCalendarApi {
    fn default() -> Self {
        Self::new(CALENDAR_API_BASE, DEFAULT_API_TIMEOUT)
    }
}

impl GoogleCalendarApi {
    /// Creates a client against `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: GoogleHttp::new(base_url, timeout),
            window_back: DEFAULT_WINDOW_MONTHS,
            window_forward: DEFAULT_WINDOW_MONTHS,
            cursor_windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Builder method to set the listing window in months around now.
    pub fn with_window(mut self, back: u32, forward: u32) -> Self {
        self.window_back = back;
        self.window_forward = forward;
        self
    }

    /// Returns the window a new listing would use.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::around(Utc::now(), self.window_back, self.window_forward)
    }

    /// A continuation page must repeat the query of the page that issued its
    /// token, so the first page's window is kept until the cursor is used.
    fn window_for(&self, page_token: Option<&str>) -> TimeWindow {
        page_token
            .and_then(|token| self.cursor_windows.lock().remove(token))
            .unwrap_or_else(|| self.window())
    }

    /// Returns the API base URL.
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    fn events_path(calendar_id: &str) -> String {
        format!("/calendars/{}/events", segment(calendar_id))
    }

    fn event_path(calendar_id: &str, event_id: &str) -> String {
        format!("/calendars/{}/events/{}", segment(calendar_id), segment(event_id))
    }

    async fn all_calendars(&self, token: &str) -> ProviderResult<Vec<RemoteCollection>> {
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = Vec::new();
            if let Some(ref page) = page_token {
                query.push(("pageToken", page.clone()));
            }
            let response: CalendarListResponse =
                self.http.get(token, "/users/me/calendarList", &query).await?;
            let (entries, invalid) = decode_items::<CalendarListEntry>(response.items);
            if !invalid.is_empty() {
                warn!("ignored {} undecodable calendars", invalid.len());
            }
            calendars.extend(
                entries
                    .into_iter()
                    .filter_map(|c| c.id.map(|id| RemoteCollection::new(id, c.summary))),
            );
            match response.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        debug!("fetched {} calendars", calendars.len());
        Ok(calendars)
    }
}

impl CollectionApi for GoogleCalendarApi {
    fn probe<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let query = [("maxResults", "1".to_string())];
            let _: EventsResponse = self
                .http
                .get(token, &Self::events_path(calendar_id), &query)
                .await?;
            Ok(())
        })
    }

    fn list_collections<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<RemoteCollection>>> {
        Box::pin(self.all_calendars(token))
    }

    fn create_collection<'a>(
        &'a self,
        token: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ProviderResult<RemoteCollection>> {
        Box::pin(async move {
            let body = CalendarListEntry {
                id: None,
                summary: name.to_string(),
            };
            let created: CalendarListEntry = self
                .http
                .send_json(Method::POST, token, "/calendars", &body)
                .await?;
            let id = created
                .id
                .ok_or_else(|| ProviderError::invalid_response("created calendar has no id"))?;
            Ok(RemoteCollection::new(id, created.summary))
        })
    }
}

impl RemoteApi for GoogleCalendarApi {
    type Payload = ApiEvent;

    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn service(&self) -> Service {
        Service::Calendar
    }

    fn default_collection_id(&self) -> &str {
        PRIMARY_CALENDAR
    }

    fn list_page<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
        page_token: Option<&'a str>,
    ) -> BoxFuture<'a, ProviderResult<Page<ApiEvent>>> {
        Box::pin(async move {
            let window = self.window_for(page_token);
            let mut query = vec![
                ("timeMin", window.start.to_rfc3339()),
                ("timeMax", window.end.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", EVENTS_PAGE_SIZE.to_string()),
            ];
            if let Some(page) = page_token {
                query.push(("pageToken", page.to_string()));
            }
            let response: EventsResponse = self
                .http
                .get(token, &Self::events_path(calendar_id), &query)
                .await?;
            if let Some(ref next) = response.next_page_token {
                self.cursor_windows.lock().insert(next.clone(), window);
            }
            let (items, invalid) = decode_items::<ApiEvent>(response.items);
            Ok(Page::new(items, response.next_page_token).with_invalid(invalid))
        })
    }

    fn create<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
        payload: ApiEvent,
    ) -> BoxFuture<'a, ProviderResult<ApiEvent>> {
        Box::pin(async move {
            self.http
                .send_json(Method::POST, token, &Self::events_path(calendar_id), &payload)
                .await
        })
    }

    fn update<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
        payload: ApiEvent,
    ) -> BoxFuture<'a, ProviderResult<ApiEvent>> {
        Box::pin(async move {
            self.http
                .send_json(
                    Method::PATCH,
                    token,
                    &Self::event_path(calendar_id, event_id),
                    &payload,
                )
                .await
        })
    }

    fn delete<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            self.http
                .delete(token, &Self::event_path(calendar_id, event_id))
                .await
        })
    }
}
