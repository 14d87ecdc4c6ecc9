//! Time types for events.
//!
//! This module provides [`EventTime`] for representing event start/end times
//! (which may be either a specific datetime or an all-day date), and
//! [`TimeWindow`] for bounding remote event listings.

use chrono::{DateTime, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Represents the start or end of an event.
///
/// - **DateTime**: A specific point in time (stored as UTC)
/// - **AllDay**: A date without a specific time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A specific datetime, stored in UTC.
    DateTime(DateTime<Utc>),
    /// An all-day event date (no specific time).
    AllDay(NaiveDate),
}

impl EventTime {
    /// Creates a new `EventTime::DateTime` from a UTC datetime.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }

    /// Creates a new `EventTime::DateTime` from a datetime in any timezone.
    pub fn from_local<Tz: TimeZone>(dt: DateTime<Tz>) -> Self {
        Self::DateTime(dt.with_timezone(&Utc))
    }

    /// Creates a new `EventTime::AllDay` from a date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::AllDay(date)
    }

    /// Returns `true` if this is an all-day event time.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Converts to a UTC datetime for comparison purposes.
    ///
    /// For all-day events, returns midnight UTC on that date.
    pub fn to_utc_datetime(&self) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => date.and_time(NaiveTime::MIN).and_utc(),
        }
    }

    /// Returns the date portion of this event time.
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::DateTime(dt) => dt.date_naive(),
            Self::AllDay(date) => *date,
        }
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_utc_datetime().cmp(&other.to_utc_datetime())
    }
}

/// A time window for listing events.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window, ordering the bounds if they are swapped.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Creates a window spanning `back` months before and `forward` months
    /// after `now`.
    pub fn around(now: DateTime<Utc>, back: u32, forward: u32) -> Self {
        let start = now.checked_sub_months(Months::new(back)).unwrap_or(now);
        let end = now.checked_add_months(Months::new(forward)).unwrap_or(now);
        Self::new(start, end)
    }

    /// Checks if a datetime falls within this window.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn all_day_compares_at_midnight() {
        let all_day = EventTime::from_date(date(2025, 2, 5));
        let morning = EventTime::from_utc(utc(2025, 2, 5, 9, 0, 0));
        assert!(all_day < morning);
        assert_eq!(all_day.to_utc_datetime(), utc(2025, 2, 5, 0, 0, 0));
    }

    #[test]
    fn date_extraction() {
        let et = EventTime::from_utc(utc(2025, 2, 5, 23, 59, 0));
        assert_eq!(et.date(), date(2025, 2, 5));
        assert!(!et.is_all_day());
    }

    #[test]
    fn window_around_spans_months() {
        let now = utc(2025, 5, 31, 12, 0, 0);
        let window = TimeWindow::around(now, 3, 3);
        assert_eq!(window.start, utc(2025, 2, 28, 12, 0, 0));
        assert_eq!(window.end, utc(2025, 8, 31, 12, 0, 0));
        assert!(window.contains(now));
        assert!(!window.contains(window.end));
    }

    #[test]
    fn window_orders_swapped_bounds() {
        let a = utc(2025, 1, 1, 0, 0, 0);
        let b = utc(2025, 1, 2, 0, 0, 0);
        let window = TimeWindow::new(b, a);
        assert_eq!(window.start, a);
        assert_eq!(window.end, b);
    }

    #[test]
    fn serde_roundtrip() {
        let et = EventTime::from_date(date(2025, 3, 1));
        let json = serde_json::to_string(&et).unwrap();
        let back: EventTime = serde_json::from_str(&json).unwrap();
        assert_eq!(et, back);
    }
}
