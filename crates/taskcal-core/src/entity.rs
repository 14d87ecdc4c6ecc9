//! Local entities: tasks and events.
//!
//! These are the shapes held by the local entity store. Provider payloads are
//! converted to and from them by the provider mappers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EntityId;
use crate::time::EventTime;

/// Behaviour shared by every locally stored entity.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Returns the entity identifier.
    fn id(&self) -> &EntityId;

    /// Replaces the entity identifier.
    fn set_id(&mut self, id: EntityId);

    /// Returns the local collection name (task list or calendar), if any.
    fn collection(&self) -> Option<&str>;

    /// Returns when the entity was last modified locally.
    fn updated_at(&self) -> DateTime<Utc>;
}

/// A to-do item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Identifier (tagged once synchronized).
    pub id: EntityId,
    /// Title.
    pub title: String,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Due date (providers only honour the date part).
    #[serde(default)]
    pub due: Option<NaiveDate>,
    /// Whether the task is done.
    #[serde(default)]
    pub completed: bool,
    /// Local list name.
    #[serde(default)]
    pub list: Option<String>,
    /// Last local modification.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates an open task with no due date.
    pub fn new(id: impl Into<EntityId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            notes: None,
            due: None,
            completed: false,
            list: None,
            updated_at: Utc::now(),
        }
    }

    /// Builder method to set the due date.
    pub fn with_due(mut self, due: NaiveDate) -> Self {
        self.due = Some(due);
        self
    }

    /// Builder method to set notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Builder method to mark the task completed.
    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Builder method to set the list name.
    pub fn with_list(mut self, list: impl Into<String>) -> Self {
        self.list = Some(list.into());
        self
    }
}

impl Entity for Task {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn collection(&self) -> Option<&str> {
        self.list.as_deref()
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Recurrence frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceType {
    /// Every day.
    Daily,
    /// Every week.
    Weekly,
    /// Every month.
    Monthly,
    /// Every year.
    Yearly,
}

/// A structured recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recurrence {
    /// Repeat frequency.
    #[serde(rename = "type")]
    pub kind: RecurrenceType,
    /// Repeat every N periods (absent means 1).
    #[serde(default)]
    pub interval: Option<u32>,
    /// Stop after N occurrences.
    #[serde(default)]
    pub count: Option<u32>,
    /// Last date on which an occurrence may start.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl Recurrence {
    /// Creates an open-ended rule with the given frequency.
    pub fn new(kind: RecurrenceType) -> Self {
        Self {
            kind,
            interval: None,
            count: None,
            end_date: None,
        }
    }

    /// Builder method to set the interval.
    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Builder method to set the occurrence count.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Builder method to set the end date.
    pub fn with_end_date(mut self, end: NaiveDate) -> Self {
        self.end_date = Some(end);
        self
    }
}

/// A calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier (tagged once synchronized).
    pub id: EntityId,
    /// Title.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Location.
    #[serde(default)]
    pub location: Option<String>,
    /// Start.
    pub start: EventTime,
    /// End.
    pub end: EventTime,
    /// Recurrence rule.
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    /// Colour as a `#rrggbb` hex string.
    #[serde(default)]
    pub color: Option<String>,
    /// Minutes before start at which a pop-up reminder fires.
    #[serde(default)]
    pub reminder_minutes: Option<u32>,
    /// Local calendar name.
    #[serde(default)]
    pub calendar: Option<String>,
    /// Last local modification.
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Creates an event with the given bounds.
    pub fn new(
        id: impl Into<EntityId>,
        title: impl Into<String>,
        start: EventTime,
        end: EventTime,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            location: None,
            start,
            end,
            recurrence: None,
            color: None,
            reminder_minutes: None,
            calendar: None,
            updated_at: Utc::now(),
        }
    }

    /// Builder method to set the recurrence rule.
    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = Some(recurrence);
        self
    }

    /// Builder method to set the colour.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Builder method to set the reminder offset.
    pub fn with_reminder(mut self, minutes: u32) -> Self {
        self.reminder_minutes = Some(minutes);
        self
    }

    /// Builder method to set the calendar name.
    pub fn with_calendar(mut self, calendar: impl Into<String>) -> Self {
        self.calendar = Some(calendar.into());
        self
    }
}

impl Entity for Event {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn collection(&self) -> Option<&str> {
        self.calendar.as_deref()
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
