//! Task handlers

use super::{require_owner, required_text};
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppJson, AppPath};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use todo_core::{ResourceRef, Task, TaskUpdate};
use utoipa::ToSchema;
use uuid::Uuid;

/// Task creation request
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
}

/// Partial task update
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
}

/// Task representation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: Uuid,
    pub list_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            list_id: task.list_id,
            user_id: task.user_id,
            title: task.title,
            completed: task.completed,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}",
    tag = "tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task", body = TaskResponse),
        (status = 403, description = "Owned by another user", body = crate::error::ApiError),
        (status = 404, description = "Task not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<TaskResponse>, AppError> {
    require_owner(&state, user, ResourceRef::Task(id), &headers).await?;

    let task = state
        .resources
        .get_task(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;
    Ok(Json(task.into()))
}

#[utoipa::path(
    patch,
    path = "/api/v1/tasks/{id}",
    tag = "tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Updated task", body = TaskResponse),
        (status = 400, description = "Invalid update", body = crate::error::ApiError),
        (status = 403, description = "Owned by another user", body = crate::error::ApiError),
        (status = 404, description = "Task not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    AppPath(id): AppPath<Uuid>,
    AppJson(request): AppJson<UpdateTaskRequest>,
) -> Result<Json<TaskResponse>, AppError> {
    require_owner(&state, user, ResourceRef::Task(id), &headers).await?;

    let title = request
        .title
        .map(|t| required_text("title", &t))
        .transpose()?;
    let task = state
        .resources
        .update_task(
            id,
            TaskUpdate {
                title,
                completed: request.completed,
            },
        )
        .await?;

    Ok(Json(task.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/tasks/{id}",
    tag = "tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 403, description = "Owned by another user", body = crate::error::ApiError),
        (status = 404, description = "Task not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    AppPath(id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    require_owner(&state, user, ResourceRef::Task(id), &headers).await?;
    state.resources.delete_task(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
