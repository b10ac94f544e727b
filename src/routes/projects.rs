//! Project routes: workspaces and classes, plus project-scoped tasks,
//! task extraction, and assignments.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use crate::services::assignment::{self, Assignment, NewAssignment};
use crate::services::project::{self, LeaveOutcome, NewProject, Project, ProjectType};
use crate::services::task::{self, NewTask, Task, TaskUpdate};
use crate::services::task_extract;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProjectListQuery {
    #[serde(default)]
    pub project_type: Option<ProjectType>,
}

#[derive(Debug, Serialize)]
pub struct ProjectWithTasks {
    #[serde(flatten)]
    pub project: Project,
    pub tasks: Vec<Task>,
}

/// `POST /projects`
pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<NewProject>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let project = project::create_project(&state.pool, auth.user.id, body).await?;
    info!(project_id = %project.id, owner_id = %auth.user.id, kind = project.project_type.as_str(), "project created");
    Ok((StatusCode::CREATED, Json(project)))
}

/// `GET /projects?project_type=`
pub async fn list_projects(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ProjectListQuery>,
) -> Result<Json<Vec<Project>>, ApiError> {
    Ok(Json(project::list_projects(&state.pool, auth.user.id, query.project_type).await?))
}

/// `GET /projects/{id}`: the project with its tasks.
pub async fn get_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectWithTasks>, ApiError> {
    let project = project::get_project_for_member(&state.pool, project_id, auth.user.id).await?;
    let tasks = task::list_for_project(&state.pool, project_id).await?;
    Ok(Json(ProjectWithTasks { project, tasks }))
}

/// `POST /projects/join/{invite_code}`
pub async fn join_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(invite_code): Path<String>,
) -> Result<Json<Project>, ApiError> {
    let project = project::join_by_invite_code(&state.pool, &invite_code, auth.user.id).await?;
    info!(project_id = %project.id, user_id = %auth.user.id, "joined project");
    Ok(Json(project))
}

/// `POST /projects/{id}/leave`
pub async fn leave_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let outcome = project::leave_project(&state.pool, project_id, auth.user.id).await?;
    match outcome {
        LeaveOutcome::Left => info!(%project_id, user_id = %auth.user.id, "left project"),
        LeaveOutcome::OwnershipTransferred { new_owner } => {
            info!(%project_id, user_id = %auth.user.id, %new_owner, "owner left; ownership transferred");
        }
        LeaveOutcome::Deleted => info!(%project_id, "last member left; project deleted"),
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /projects/{id}`
pub async fn delete_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    project::delete_project(&state.pool, project_id, auth.user.id).await?;
    info!(%project_id, "project deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /projects/all`
pub async fn delete_all_projects(State(state): State<AppState>, auth: AuthUser) -> Result<StatusCode, ApiError> {
    let deleted = project::delete_owned_projects(&state.pool, auth.user.id).await?;
    info!(user_id = %auth.user.id, deleted, "owned projects deleted");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// PROJECT-SCOPED TASKS
// =============================================================================

/// `POST /projects/{id}/tasks`
pub async fn create_project_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(body): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = task::create_task(&state.pool, auth.user.id, Some(project_id), body).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// `PUT /projects/{id}/tasks/{task_id}`
pub async fn update_project_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<TaskUpdate>,
) -> Result<Json<Task>, ApiError> {
    let task = task::update_task(&state.pool, auth.user.id, task_id, Some(project_id), body).await?;
    Ok(Json(task))
}

/// `POST /projects/{id}/extract-tasks`
pub async fn extract_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.rate_limiter.check_and_record(auth.user.id)?;
    let outcome = task_extract::extract_project_tasks(&state, auth.user.id, project_id).await?;
    Ok(Json(json!({
        "message": outcome.message(),
        "project_id": project_id,
        "created": outcome.created,
        "updated": outcome.updated,
    })))
}

// =============================================================================
// ASSIGNMENTS
// =============================================================================

/// `POST /projects/{id}/assignments`
pub async fn create_assignment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(body): Json<NewAssignment>,
) -> Result<(StatusCode, Json<Assignment>), ApiError> {
    let created = assignment::create_assignment(&state.pool, auth.user.id, project_id, body).await?;
    info!(%project_id, assignment_id = %created.id, "assignment created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /projects/{id}/assignments`
pub async fn list_assignments(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Assignment>>, ApiError> {
    Ok(Json(assignment::list_assignments(&state.pool, auth.user.id, project_id).await?))
}
