//! Conversion between local tasks and Google Tasks payloads.
//!
//! Google stores the due date as an RFC 3339 timestamp but ignores the time
//! of day, so dates go out as midnight UTC and come back as the UTC date.

use chrono::{DateTime, NaiveDate, Utc};
use taskcal_core::{EntityId, Provider, Task};

use super::tasks::ApiTask;
use crate::batch::Operation;
use crate::error::{ProviderError, ProviderResult};
use crate::remote::EntityMapper;

const STATUS_COMPLETED: &str = "completed";
const STATUS_NEEDS_ACTION: &str = "needsAction";

/// Maps [`Task`] to and from [`ApiTask`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleTaskMapper;

fn format_due(date: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", date.format("%Y-%m-%d"))
}

fn parse_due(raw: &str) -> ProviderResult<NaiveDate> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .map_err(|e| ProviderError::validation(format!("invalid due date {:?}: {}", raw, e)))
}

impl EntityMapper for GoogleTaskMapper {
    type Entity = Task;
    type Payload = ApiTask;

    fn to_remote(&self, task: &Task, operation: Operation) -> ProviderResult<ApiTask> {
        // Re-opening a task on update needs an explicit status
        let status = match (task.completed, operation) {
            (true, _) => Some(STATUS_COMPLETED.to_string()),
            (false, Operation::Update) => Some(STATUS_NEEDS_ACTION.to_string()),
            (false, Operation::Create) => None,
        };

        Ok(ApiTask {
            id: None,
            title: Some(task.title.clone()),
            notes: task.notes.clone(),
            status,
            due: task.due.map(format_due),
            updated: None,
            deleted: None,
        })
    }

    fn from_remote(&self, payload: ApiTask, list: Option<&str>) -> ProviderResult<Option<Task>> {
        if payload.deleted == Some(true) {
            return Ok(None);
        }
        let id = payload
            .id
            .ok_or_else(|| ProviderError::validation("task has no id"))?;

        let due = payload.due.as_deref().map(parse_due).transpose()?;
        let updated_at = payload
            .updated
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Some(Task {
            id: EntityId::remote(Provider::Google, id),
            title: payload.title.unwrap_or_default(),
            notes: payload.notes.filter(|n| !n.is_empty()),
            due,
            completed: payload.status.as_deref() == Some(STATUS_COMPLETED),
            list: list.map(str::to_string),
            updated_at,
        }))
    }

    fn remote_id<'p>(&self, payload: &'p ApiTask) -> Option<&'p str> {
        payload.id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn create_payload() {
        let task = Task::new("a", "Buy milk")
            .with_due(date(2025, 3, 9))
            .with_notes("2 litres");
        let payload = GoogleTaskMapper.to_remote(&task, Operation::Create).unwrap();

        assert_eq!(payload.title.as_deref(), Some("Buy milk"));
        assert_eq!(payload.due.as_deref(), Some("2025-03-09T00:00:00.000Z"));
        assert_eq!(payload.notes.as_deref(), Some("2 litres"));
        assert_eq!(payload.status, None);
        assert_eq!(payload.id, None);
    }

    #[test]
    fn status_on_update() {
        let open = Task::new("google-x", "T");
        let done = Task::new("google-x", "T").with_completed(true);

        let payload = GoogleTaskMapper.to_remote(&open, Operation::Update).unwrap();
        assert_eq!(payload.status.as_deref(), Some("needsAction"));
        let payload = GoogleTaskMapper.to_remote(&done, Operation::Create).unwrap();
        assert_eq!(payload.status.as_deref(), Some("completed"));
    }

    #[test]
    fn remote_task_is_tagged() {
        let payload = ApiTask {
            id: Some("MTIz".into()),
            title: Some("Buy milk".into()),
            status: Some("completed".into()),
            due: Some("2025-03-09T00:00:00.000Z".into()),
            updated: Some("2025-03-01T10:00:00.000Z".into()),
            ..ApiTask::default()
        };
        let task = GoogleTaskMapper
            .from_remote(payload, Some("Work"))
            .unwrap()
            .unwrap();

        assert_eq!(task.id.to_string(), "google-MTIz");
        assert!(task.completed);
        assert_eq!(task.due, Some(date(2025, 3, 9)));
        assert_eq!(task.list.as_deref(), Some("Work"));
        assert_eq!(task.updated_at.to_rfc3339(), "2025-03-01T10:00:00+00:00");
    }

    #[test]
    fn due_offset_resolves_to_utc_date() {
        let payload = ApiTask {
            id: Some("t".into()),
            due: Some("2025-03-09T23:30:00-02:00".into()),
            ..ApiTask::default()
        };
        let task = GoogleTaskMapper.from_remote(payload, None).unwrap().unwrap();
        assert_eq!(task.due, Some(date(2025, 3, 10)));
    }

    #[test]
    fn deleted_tasks_are_skipped() {
        let payload = ApiTask {
            id: Some("t".into()),
            deleted: Some(true),
            ..ApiTask::default()
        };
        assert!(GoogleTaskMapper.from_remote(payload, None).unwrap().is_none());
    }

    #[test]
    fn malformed_due_is_a_validation_error() {
        let payload = ApiTask {
            id: Some("t".into()),
            due: Some("next tuesday".into()),
            ..ApiTask::default()
        };
        let err = GoogleTaskMapper.from_remote(payload, None).unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ValidationError);
    }
}
