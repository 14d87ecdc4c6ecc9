//! RFC 5545 `RRULE` strings for the subset of rules local events express.
//!
//! Only `FREQ`, `INTERVAL`, `COUNT` and `UNTIL` are understood. Other parts
//! (`BYDAY`, `WKST`, ...) are dropped on import. `UNTIL` is written as the
//! last second of the end date in UTC so the end date itself stays included.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use taskcal_core::{Recurrence, RecurrenceType};

use crate::error::{ProviderError, ProviderResult};

const PREFIX: &str = "RRULE:";

fn freq(kind: RecurrenceType) -> &'static str {
    match kind {
        RecurrenceType::Daily => "DAILY",
        RecurrenceType::Weekly => "WEEKLY",
        RecurrenceType::Monthly => "MONTHLY",
        RecurrenceType::Yearly => "YEARLY",
    }
}

/// Serializes a rule as a single `RRULE:` line.
pub fn to_rrule(rule: &Recurrence) -> String {
    let mut parts = vec![format!("FREQ={}", freq(rule.kind))];
    if let Some(interval) = rule.interval.filter(|i| *i > 1) {
        parts.push(format!("INTERVAL={}", interval));
    }
    if let Some(count) = rule.count {
        parts.push(format!("COUNT={}", count));
    }
    if let Some(end) = rule.end_date {
        parts.push(format!("UNTIL={}T235959Z", end.format("%Y%m%d")));
    }
    format!("{}{}", PREFIX, parts.join(";"))
}

fn parse_until(raw: &str) -> ProviderResult<NaiveDate> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%SZ") {
        return Ok(dt.and_utc().date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y%m%dT%H%M%S%z") {
        return Ok(dt.with_timezone(&Utc).date_naive());
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .map_err(|_| ProviderError::validation(format!("invalid UNTIL value {:?}", raw)))
}

fn parse_number(key: &str, raw: &str) -> ProviderResult<u32> {
    raw.parse()
        .map_err(|_| ProviderError::validation(format!("invalid {} value {:?}", key, raw)))
}

/// Parses one `RRULE` line.
pub fn from_rrule(line: &str) -> ProviderResult<Recurrence> {
    let body = line.trim().strip_prefix(PREFIX).unwrap_or(line.trim());
    let mut kind = None;
    let mut rule_interval = None;
    let mut count = None;
    let mut end_date = None;

    for part in body.split(';').filter(|p| !p.is_empty()) {
        let Some((key, value)) = part.split_once('=') else {
            return Err(ProviderError::validation(format!("malformed rule part {:?}", part)));
        };
        match key.to_ascii_uppercase().as_str() {
            "FREQ" => {
                kind = Some(match value.to_ascii_uppercase().as_str() {
                    "DAILY" => RecurrenceType::Daily,
                    "WEEKLY" => RecurrenceType::Weekly,
                    "MONTHLY" => RecurrenceType::Monthly,
                    "YEARLY" => RecurrenceType::Yearly,
                    other => {
                        return Err(ProviderError::validation(format!(
                            "unsupported frequency {}",
                            other
                        )));
                    }
                })
            }
            "INTERVAL" => rule_interval = Some(parse_number("INTERVAL", value)?),
            "COUNT" => count = Some(parse_number("COUNT", value)?),
            "UNTIL" => end_date = Some(parse_until(value)?),
            _ => {}
        }
    }

    let kind = kind.ok_or_else(|| ProviderError::validation(format!("rule has no FREQ: {}", line)))?;
    Ok(Recurrence {
        kind,
        interval: rule_interval.filter(|i| *i > 1),
        count,
        end_date,
    })
}

/// Returns the first `RRULE` of an event's recurrence lines, parsed.
///
/// `EXDATE`/`RDATE` lines are ignored.
pub fn from_recurrence_lines(lines: &[String]) -> ProviderResult<Option<Recurrence>> {
    lines
        .iter()
        .find(|l| l.trim_start().starts_with(PREFIX))
        .map(|l| from_rrule(l))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn serializes_all_parts() {
        let rule = Recurrence::new(RecurrenceType::Weekly)
            .with_interval(2)
            .with_count(10)
            .with_end_date(date(2025, 12, 31));
        assert_eq!(
            to_rrule(&rule),
            "RRULE:FREQ=WEEKLY;INTERVAL=2;COUNT=10;UNTIL=20251231T235959Z"
        );
        assert_eq!(from_rrule(&to_rrule(&rule)).unwrap(), rule);
    }

    #[test]
    fn interval_of_one_is_implicit() {
        let rule = Recurrence::new(RecurrenceType::Daily).with_interval(1);
        assert_eq!(to_rrule(&rule), "RRULE:FREQ=DAILY");
        assert_eq!(from_rrule("RRULE:FREQ=DAILY;INTERVAL=1").unwrap().interval, None);
    }

    #[test]
    fn until_accepts_date_and_datetime() {
        let a = from_rrule("RRULE:FREQ=MONTHLY;UNTIL=20250630").unwrap();
        let b = from_rrule("RRULE:FREQ=MONTHLY;UNTIL=20250630T120000Z").unwrap();
        assert_eq!(a.end_date, Some(date(2025, 6, 30)));
        assert_eq!(b.end_date, Some(date(2025, 6, 30)));
    }

    #[test]
    fn unknown_parts_are_dropped() {
        let rule = from_rrule("RRULE:FREQ=WEEKLY;BYDAY=MO,WE;WKST=MO").unwrap();
        assert_eq!(rule, Recurrence::new(RecurrenceType::Weekly));
    }

    #[test]
    fn rejects_missing_or_unknown_frequency() {
        assert!(from_rrule("RRULE:COUNT=3").is_err());
        assert!(from_rrule("RRULE:FREQ=HOURLY").is_err());
        assert!(from_rrule("RRULE:FREQ=DAILY;COUNT=x").is_err());
    }

    #[test]
    fn picks_rrule_line() {
        let lines = vec![
            "EXDATE;VALUE=DATE:20250101".to_string(),
            "RRULE:FREQ=YEARLY".to_string(),
        ];
        let rule = from_recurrence_lines(&lines).unwrap().unwrap();
        assert_eq!(rule.kind, RecurrenceType::Yearly);
        assert!(from_recurrence_lines(&[]).unwrap().is_none());
    }
}
