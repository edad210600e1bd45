//! To-do list handlers
//!
//! All routes require a bearer token; by-id routes also require ownership.

use super::{require_owner, required_text};
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppJson, AppPath};
use crate::handlers::tasks::{CreateTaskRequest, TaskResponse};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use todo_core::{NewTask, ResourceRef, TodoList};
use utoipa::ToSchema;
use uuid::Uuid;

/// List creation request
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateListRequest {
    pub name: String,
}

/// List representation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TodoList> for ListResponse {
    fn from(list: TodoList) -> Self {
        Self {
            id: list.id,
            user_id: list.user_id,
            name: list.name,
            created_at: list.created_at,
            updated_at: list.updated_at,
        }
    }
}

/// Lists owned by the caller
#[utoipa::path(
    get,
    path = "/api/v1/lists",
    tag = "lists",
    responses(
        (status = 200, description = "Caller's lists", body = [ListResponse]),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_lists(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<ListResponse>>, AppError> {
    let lists = state.resources.lists_for_user(user.user_id).await?;
    Ok(Json(lists.into_iter().map(ListResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/v1/lists",
    tag = "lists",
    request_body = CreateListRequest,
    responses(
        (status = 201, description = "List created", body = ListResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_list(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppJson(request): AppJson<CreateListRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = required_text("name", &request.name)?;
    let list = state
        .resources
        .create_list(TodoList::new(user.user_id, name))
        .await?;

    Ok((StatusCode::CREATED, Json(ListResponse::from(list))))
}

#[utoipa::path(
    get,
    path = "/api/v1/lists/{id}",
    tag = "lists",
    params(("id" = Uuid, Path, description = "List id")),
    responses(
        (status = 200, description = "List", body = ListResponse),
        (status = 403, description = "Owned by another user", body = crate::error::ApiError),
        (status = 404, description = "List not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_list(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ListResponse>, AppError> {
    require_owner(&state, user, ResourceRef::List(id), &headers).await?;

    let list = state
        .resources
        .get_list(id)
        .await?
        .ok_or_else(|| AppError::NotFound("List not found".to_string()))?;
    Ok(Json(list.into()))
}

/// Delete a list and its tasks
#[utoipa::path(
    delete,
    path = "/api/v1/lists/{id}",
    tag = "lists",
    params(("id" = Uuid, Path, description = "List id")),
    responses(
        (status = 204, description = "List deleted"),
        (status = 403, description = "Owned by another user", body = crate::error::ApiError),
        (status = 404, description = "List not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_list(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    AppPath(id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    require_owner(&state, user, ResourceRef::List(id), &headers).await?;
    state.resources.delete_list(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/lists/{id}/tasks",
    tag = "lists",
    params(("id" = Uuid, Path, description = "List id")),
    responses(
        (status = 200, description = "Tasks in the list", body = [TaskResponse]),
        (status = 403, description = "Owned by another user", body = crate::error::ApiError),
        (status = 404, description = "List not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Vec<TaskResponse>>, AppError> {
    require_owner(&state, user, ResourceRef::List(id), &headers).await?;

    let tasks = state.resources.tasks_for_list(id).await?;
    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/v1/lists/{id}/tasks",
    tag = "lists",
    params(("id" = Uuid, Path, description = "List id")),
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = TaskResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 403, description = "Owned by another user", body = crate::error::ApiError),
        (status = 404, description = "List not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    AppPath(id): AppPath<Uuid>,
    AppJson(request): AppJson<CreateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_owner(&state, user, ResourceRef::List(id), &headers).await?;

    let title = required_text("title", &request.title)?;
    let task = state
        .resources
        .create_task(NewTask {
            list_id: id,
            user_id: user.user_id,
            title,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(TaskResponse::from(task))))
}
