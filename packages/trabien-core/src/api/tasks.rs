//! Task endpoints and their wire types.
//!
//! Tasks are workspace-scoped calendar entries. Field names follow the
//! backend exactly: task fields are snake_case, response envelopes are
//! camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::client::ApiClient;
use super::error::ApiResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[serde(alias = "TODO")]
    Todo,
    #[serde(alias = "IN_PROGRESS")]
    InProgress,
    #[serde(alias = "DONE")]
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: i64,
    pub updated_by: i64,
    pub workspace_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskPayload {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub color: String,
    pub tag_ids: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    pub workspace_id: i64,
}

/// Partial update; only the populated fields are sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTaskPayload {
    pub task_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl UpdateTaskPayload {
    /// An update that touches nothing yet; set the fields to change.
    pub fn new(task_id: i64) -> Self {
        Self {
            task_id,
            title: None,
            start_time: None,
            end_time: None,
            content: None,
            color: None,
            tag_ids: None,
            status: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TasksResponse {
    pub tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskResponse {
    pub success: bool,
    pub task_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeleteTaskResponse {
    pub success: bool,
}

impl ApiClient {
    /// List the tasks of a workspace.
    pub async fn tasks(&self, workspace_id: i64) -> ApiResult<TasksResponse> {
        self.get(&format!("/api/tasks?workspace_id={workspace_id}"))
            .await
    }

    pub async fn create_task(&self, payload: &CreateTaskPayload) -> ApiResult<CreateTaskResponse> {
        self.post("/api/tasks", payload).await
    }

    pub async fn update_task(&self, payload: &UpdateTaskPayload) -> ApiResult<UpdateTaskResponse> {
        self.patch("/api/tasks", payload).await
    }

    pub async fn delete_task(&self, task_id: i64) -> ApiResult<DeleteTaskResponse> {
        self.delete(&format!("/api/tasks?task_id={task_id}")).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::auth::CredentialStore;

    use super::*;

    #[test]
    fn task_deserializes_backend_shape() {
        let task: Task = serde_json::from_value(json!({
            "id": 12,
            "title": "Write release notes",
            "start_time": "2026-03-02T09:00:00Z",
            "end_time": "2026-03-02T10:00:00Z",
            "content": "v1.1 highlights",
            "color": "#f59e0b",
            "tag_ids": [3, 5],
            "status": "IN_PROGRESS",
            "created_at": "2026-03-01T08:00:00Z",
            "updated_at": "2026-03-01T08:30:00Z",
            "created_by": 4,
            "updated_by": 4,
            "workspace_id": 7
        }))
        .unwrap();

        assert_eq!(task.id, 12);
        assert_eq!(task.status, Some(TaskStatus::InProgress));
        assert_eq!(task.tag_ids.as_deref(), Some(&[3, 5][..]));
    }

    #[test]
    fn update_payload_omits_untouched_fields() {
        let mut payload = UpdateTaskPayload::new(9);
        payload.status = Some(TaskStatus::Done);

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value, json!({"task_id": 9, "status": "done"}));
    }

    #[tokio::test]
    async fn tasks_query_carries_workspace_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .and(query_param("workspace_id", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tasks": []})))
            .mount(&server)
            .await;

        let store = Arc::new(CredentialStore::new());
        store.set_access_token(Some("token".to_string()));
        let client = ApiClient::new(server.uri(), store);

        let response = client.tasks(7).await.unwrap();
        assert!(response.tasks.is_empty());
    }
}
