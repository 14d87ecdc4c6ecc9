//! Conversion between local events and Google Calendar payloads.

use chrono::{DateTime, NaiveDate, Utc};
use taskcal_core::{EntityId, Event, EventTime, Provider};

use super::calendar::{ApiEvent, ApiEventTime, ApiReminderOverride, ApiReminders};
use super::colors::{color_id_for_hex, hex_for_color_id};
use super::recurrence::{from_recurrence_lines, to_rrule};
use crate::batch::Operation;
use crate::error::{ProviderError, ProviderResult};
use crate::remote::EntityMapper;

const POPUP: &str = "popup";

/// Maps [`Event`] to and from [`ApiEvent`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleEventMapper;

fn to_api_time(time: EventTime) -> ApiEventTime {
    match time {
        EventTime::DateTime(dt) => ApiEventTime {
            date_time: Some(dt.to_rfc3339()),
            ..ApiEventTime::default()
        },
        EventTime::AllDay(date) => ApiEventTime {
            date: Some(date.format("%Y-%m-%d").to_string()),
            ..ApiEventTime::default()
        },
    }
}

fn from_api_time(time: &ApiEventTime) -> ProviderResult<EventTime> {
    if let Some(ref raw) = time.date_time {
        return DateTime::parse_from_rfc3339(raw)
            .map(EventTime::from_local)
            .map_err(|e| ProviderError::validation(format!("invalid dateTime {:?}: {}", raw, e)));
    }
    if let Some(ref raw) = time.date {
        return NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(EventTime::AllDay)
            .map_err(|e| ProviderError::validation(format!("invalid date {:?}: {}", raw, e)));
    }
    Err(ProviderError::validation("event time has neither dateTime nor date"))
}

fn reminders(minutes: Option<u32>, operation: Operation) -> Option<ApiReminders> {
    match (minutes, operation) {
        (Some(minutes), _) => Some(ApiReminders {
            use_default: false,
            overrides: vec![ApiReminderOverride {
                method: POPUP.to_string(),
                minutes,
            }],
        }),
        // Clearing a reminder falls back to the calendar defaults
        (None, Operation::Update) => Some(ApiReminders {
            use_default: true,
            overrides: Vec::new(),
        }),
        (None, Operation::Create) => None,
    }
}

impl EntityMapper for GoogleEventMapper {
    type Entity = Event;
    type Payload = ApiEvent;

    fn to_remote(&self, event: &Event, operation: Operation) -> ProviderResult<ApiEvent> {
        if event.start.is_all_day() != event.end.is_all_day() {
            return Err(ProviderError::validation(format!(
                "event {} mixes all-day and timed bounds",
                event.id
            )));
        }
        if event.end < event.start {
            return Err(ProviderError::validation(format!(
                "event {} ends before it starts",
                event.id
            )));
        }

        Ok(ApiEvent {
            summary: Some(event.title.clone()),
            description: event.description.clone(),
            location: event.location.clone(),
            start: Some(to_api_time(event.start)),
            end: Some(to_api_time(event.end)),
            recurrence: event.recurrence.as_ref().map(|r| vec![to_rrule(r)]),
            color_id: event
                .color
                .as_deref()
                .map(|hex| color_id_for_hex(hex).to_string()),
            reminders: reminders(event.reminder_minutes, operation),
            ..ApiEvent::default()
        })
    }

    fn from_remote(&self, payload: ApiEvent, calendar: Option<&str>) -> ProviderResult<Option<Event>> {
        if payload.status.as_deref() == Some("cancelled") {
            return Ok(None);
        }
        let id = payload
            .id
            .ok_or_else(|| ProviderError::validation("event has no id"))?;

        let start = payload
            .start
            .as_ref()
            .ok_or_else(|| ProviderError::validation(format!("event {} has no start", id)))
            .and_then(from_api_time)?;
        let end = match payload.end.as_ref() {
            Some(end) => from_api_time(end)?,
            None => start,
        };
        let recurrence = match payload.recurrence.as_deref() {
            Some(lines) => from_recurrence_lines(lines)?,
            None => None,
        };
        let reminder_minutes = payload.reminders.as_ref().and_then(|r| {
            r.overrides
                .iter()
                .find(|o| o.method == POPUP)
                .map(|o| o.minutes)
        });
        let updated_at = payload
            .updated
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Some(Event {
            id: EntityId::remote(Provider::Google, id),
            title: payload.summary.unwrap_or_default(),
            description: payload.description.filter(|d| !d.is_empty()),
            location: payload.location.filter(|l| !l.is_empty()),
            start,
            end,
            recurrence,
            color: payload
                .color_id
                .as_deref()
                .and_then(hex_for_color_id)
                .map(str::to_string),
            reminder_minutes,
            calendar: calendar.map(str::to_string),
            updated_at,
        }))
    }

    fn remote_id<'p>(&self, payload: &'p ApiEvent) -> Option<&'p str> {
        payload.id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use chrono::TimeZone;
    use taskcal_core::{Recurrence, RecurrenceType};

    fn utc(y: i32, m: u32, d: u32, h: u32) -> EventTime {
        EventTime::from_utc(Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn stored(mut payload: ApiEvent, id: &str) -> ApiEvent {
        payload.id = Some(id.to_string());
        payload
    }

    #[test]
    fn round_trip_keeps_mapped_fields() {
        let event = Event::new("a", "Planning", utc(2025, 5, 2, 9), utc(2025, 5, 2, 10))
            .with_recurrence(
                Recurrence::new(RecurrenceType::Weekly)
                    .with_interval(2)
                    .with_end_date(date(2025, 8, 29)),
            )
            .with_color("#33B679")
            .with_reminder(15)
            .with_calendar("Work");

        let payload = GoogleEventMapper.to_remote(&event, Operation::Create).unwrap();
        let back = GoogleEventMapper
            .from_remote(stored(payload, "ev1"), Some("Work"))
            .unwrap()
            .unwrap();

        assert_eq!(back.id.to_string(), "google-ev1");
        assert_eq!(back.title, event.title);
        assert_eq!(back.start, event.start);
        assert_eq!(back.end, event.end);
        assert_eq!(back.recurrence, event.recurrence);
        assert_eq!(back.color.as_deref(), Some("#33b679"));
        assert_eq!(back.reminder_minutes, Some(15));
        assert_eq!(back.calendar.as_deref(), Some("Work"));
    }

    #[test]
    fn all_day_events_use_dates() {
        let event = Event::new(
            "a",
            "Holiday",
            EventTime::from_date(date(2025, 12, 25)),
            EventTime::from_date(date(2025, 12, 26)),
        );
        let payload = GoogleEventMapper.to_remote(&event, Operation::Create).unwrap();
        let start = payload.start.clone().unwrap();
        assert_eq!(start.date.as_deref(), Some("2025-12-25"));
        assert_eq!(start.date_time, None);

        let back = GoogleEventMapper
            .from_remote(stored(payload, "h"), None)
            .unwrap()
            .unwrap();
        assert_eq!(back.start, EventTime::AllDay(date(2025, 12, 25)));
    }

    #[test]
    fn offset_times_normalize_to_utc() {
        let payload = ApiEvent {
            id: Some("e".into()),
            start: Some(ApiEventTime {
                date_time: Some("2025-05-02T11:00:00+02:00".into()),
                time_zone: Some("Europe/Paris".into()),
                ..ApiEventTime::default()
            }),
            ..ApiEvent::default()
        };
        let event = GoogleEventMapper.from_remote(payload, None).unwrap().unwrap();
        assert_eq!(event.start, utc(2025, 5, 2, 9));
        // No end means a zero-length event
        assert_eq!(event.end, event.start);
    }

    #[test]
    fn unknown_color_defaults() {
        let event = Event::new("a", "x", utc(2025, 1, 1, 9), utc(2025, 1, 1, 10)).with_color("#abcdef");
        let payload = GoogleEventMapper.to_remote(&event, Operation::Create).unwrap();
        assert_eq!(payload.color_id.as_deref(), Some("7"));
    }

    #[test]
    fn first_popup_reminder_wins() {
        let payload = ApiEvent {
            id: Some("e".into()),
            start: Some(ApiEventTime {
                date: Some("2025-01-01".into()),
                ..ApiEventTime::default()
            }),
            reminders: Some(ApiReminders {
                use_default: false,
                overrides: vec![
                    ApiReminderOverride { method: "email".into(), minutes: 60 },
                    ApiReminderOverride { method: "popup".into(), minutes: 10 },
                    ApiReminderOverride { method: "popup".into(), minutes: 30 },
                ],
            }),
            ..ApiEvent::default()
        };
        let event = GoogleEventMapper.from_remote(payload, None).unwrap().unwrap();
        assert_eq!(event.reminder_minutes, Some(10));
    }

    #[test]
    fn reminder_payload_by_operation() {
        let event = Event::new("a", "x", utc(2025, 1, 1, 9), utc(2025, 1, 1, 10));
        let create = GoogleEventMapper.to_remote(&event, Operation::Create).unwrap();
        assert!(create.reminders.is_none());
        let update = GoogleEventMapper.to_remote(&event, Operation::Update).unwrap();
        assert!(update.reminders.unwrap().use_default);
    }

    #[test]
    fn cancelled_events_are_skipped() {
        let payload = ApiEvent {
            id: Some("e".into()),
            status: Some("cancelled".into()),
            ..ApiEvent::default()
        };
        assert!(GoogleEventMapper.from_remote(payload, None).unwrap().is_none());
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let event = Event::new("a", "x", utc(2025, 1, 1, 10), utc(2025, 1, 1, 9));
        let err = GoogleEventMapper.to_remote(&event, Operation::Create).unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ValidationError);

        let mixed = Event::new(
            "b",
            "x",
            EventTime::from_date(date(2025, 1, 1)),
            utc(2025, 1, 1, 9),
        );
        assert!(GoogleEventMapper.to_remote(&mixed, Operation::Create).is_err());
    }
}
