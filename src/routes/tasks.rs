//! Task board routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use crate::services::task::{self, NewTask, Task, TaskFilter, TaskUpdate};
use crate::state::AppState;

/// `POST /tasks`
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = task::create_task(&state.pool, auth.user.id, None, body).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// `GET /tasks?project_id&assignee_id&status`
pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(task::list_tasks(&state.pool, auth.user.id, filter).await?))
}

/// `GET /tasks/{id}`
pub async fn get_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(task::get_task(&state.pool, auth.user.id, task_id).await?))
}

/// `PATCH /tasks/{id}`
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(task_id): Path<Uuid>,
    Json(body): Json<TaskUpdate>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(task::update_task(&state.pool, auth.user.id, task_id, None, body).await?))
}

/// `DELETE /tasks/{id}`
pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(task_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    task::delete_task(&state.pool, auth.user.id, task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
