//! Google Tasks API v1 client.

use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskcal_core::{Provider, Service};
use tracing::{debug, warn};

use super::http::{DEFAULT_API_TIMEOUT, GoogleHttp, decode_items, segment};
use crate::error::{ProviderError, ProviderResult};
use crate::lists::{CollectionApi, RemoteCollection};
use crate::provider::BoxFuture;
use crate::remote::{Page, RemoteApi};

/// Base URL for Google Tasks API v1.
pub const TASKS_API_BASE: &str = "https://tasks.googleapis.com/tasks/v1";

/// Id of the account's default task list.
pub const DEFAULT_TASK_LIST: &str = "@default";

const PAGE_SIZE: &str = "100";

/// A task as exchanged with Google.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTask {
    /// Remote id (absent on create).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// `needsAction` or `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// RFC 3339 timestamp; only the date part is meaningful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    /// Last modification, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    /// Set on tombstones returned with `showDeleted`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskListsResponse {
    #[serde(default)]
    items: Vec<Value>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiTaskList {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TasksResponse {
    #[serde(default)]
    items: Vec<Value>,
    next_page_token: Option<String>,
}

/// Google Tasks API client.
#[derive(Debug, Clone)]
pub struct GoogleTasksApi {
    http: GoogleHttp,
}

impl Default for GoogleTasksApi {
    fn default() -> Self {
        Self::new(TASKS_API_BASE, DEFAULT_API_TIMEOUT)
    }
}

impl GoogleTasksApi {
    /// Creates a client against `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: GoogleHttp::new(base_url, timeout),
        }
    }

    /// Returns the API base URL.
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    fn tasks_path(list_id: &str) -> String {
        format!("/lists/{}/tasks", segment(list_id))
    }

    fn task_path(list_id: &str, task_id: &str) -> String {
        format!("/lists/{}/tasks/{}", segment(list_id), segment(task_id))
    }

    async fn all_task_lists(&self, token: &str) -> ProviderResult<Vec<RemoteCollection>> {
        let mut lists = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("maxResults", PAGE_SIZE.to_string())];
            if let Some(ref page) = page_token {
                query.push(("pageToken", page.clone()));
            }
            let response: TaskListsResponse = self.http.get(token, "/users/@me/lists", &query).await?;
            let (entries, invalid) = decode_items::<ApiTaskList>(response.items);
            if !invalid.is_empty() {
                warn!("ignored {} undecodable task lists", invalid.len());
            }
            lists.extend(
                entries
                    .into_iter()
                    .filter_map(|l| l.id.map(|id| RemoteCollection::new(id, l.title))),
            );
            match response.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        debug!("fetched {} task lists", lists.len());
        Ok(lists)
    }
}

impl CollectionApi for GoogleTasksApi {
    fn probe<'a>(&'a self, token: &'a str, list_id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let query = [("maxResults", "1".to_string())];
            let _: TasksResponse = self.http.get(token, &Self::tasks_path(list_id), &query).await?;
            Ok(())
        })
    }

    fn list_collections<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<RemoteCollection>>> {
        Box::pin(self.all_task_lists(token))
    }

    fn create_collection<'a>(
        &'a self,
        token: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ProviderResult<RemoteCollection>> {
        Box::pin(async move {
            let body = ApiTaskList {
                id: None,
                title: name.to_string(),
            };
            let created: ApiTaskList = self
                .http
                .send_json(Method::POST, token, "/users/@me/lists", &body)
                .await?;
            let id = created
                .id
                .ok_or_else(|| ProviderError::invalid_response("created task list has no id"))?;
            Ok(RemoteCollection::new(id, created.title))
        })
    }
}

impl RemoteApi for GoogleTasksApi {
    type Payload = ApiTask;

    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn service(&self) -> Service {
        Service::Tasks
    }

    fn default_collection_id(&self) -> &str {
        DEFAULT_TASK_LIST
    }

    fn list_page<'a>(
        &'a self,
        token: &'a str,
        list_id: &'a str,
        page_token: Option<&'a str>,
    ) -> BoxFuture<'a, ProviderResult<Page<ApiTask>>> {
        Box::pin(async move {
            let mut query = vec![
                ("maxResults", PAGE_SIZE.to_string()),
                ("showCompleted", "true".to_string()),
                ("showHidden", "true".to_string()),
            ];
            if let Some(page) = page_token {
                query.push(("pageToken", page.to_string()));
            }
            let response: TasksResponse = self.http.get(token, &Self::tasks_path(list_id), &query).await?;
            let (items, invalid) = decode_items::<ApiTask>(response.items);
            Ok(Page::new(items, response.next_page_token).with_invalid(invalid))
        })
    }

    fn create<'a>(
        &'a self,
        token: &'a str,
        list_id: &'a str,
        payload: ApiTask,
    ) -> BoxFuture<'a, ProviderResult<ApiTask>> {
        Box::pin(async move {
            self.http
                .send_json(Method::POST, token, &Self::tasks_path(list_id), &payload)
                .await
        })
    }

    fn update<'a>(
        &'a self,
        token: &'a str,
        list_id: &'a str,
        task_id: &'a str,
        payload: ApiTask,
    ) -> BoxFuture<'a, ProviderResult<ApiTask>> {
        Box::pin(async move {
            self.http
                .send_json(Method::PATCH, token, &Self::task_path(list_id, task_id), &payload)
                .await
        })
    }

    fn delete<'a>(
        &'a self,
        token: &'a str,
        list_id: &'a str,
        task_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move { self.http.delete(token, &Self::task_path(list_id, task_id)).await })
    }
}
