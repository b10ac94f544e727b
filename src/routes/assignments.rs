//! Submission routes for class assignments.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use crate::services::assignment::{self, Submission};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmissionBody {
    pub content: String,
}

/// `POST /assignments/{id}/submissions`
pub async fn submit(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(assignment_id): Path<Uuid>,
    Json(body): Json<SubmissionBody>,
) -> Result<(StatusCode, Json<Submission>), ApiError> {
    let submission = assignment::submit(&state.pool, auth.user.id, assignment_id, &body.content).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

/// `GET /assignments/{id}/submissions`
pub async fn list_submissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(assignment_id): Path<Uuid>,
) -> Result<Json<Vec<Submission>>, ApiError> {
    Ok(Json(assignment::list_submissions(&state.pool, auth.user.id, assignment_id).await?))
}
