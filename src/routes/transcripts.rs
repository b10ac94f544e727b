//! Transcript routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use crate::services::transcript::{self, DEFAULT_LIST_LIMIT, NewTranscript, Transcript};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TranscriptListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIST_LIMIT
}

/// `POST /transcripts`
pub async fn create_transcript(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<NewTranscript>,
) -> Result<(StatusCode, Json<Transcript>), ApiError> {
    let line = transcript::create_transcript(&state.pool, auth.user.id, body).await?;
    Ok((StatusCode::CREATED, Json(line)))
}

/// `GET /transcripts/meeting/{id}?limit=`
pub async fn list_for_meeting(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(meeting_id): Path<Uuid>,
    Query(query): Query<TranscriptListQuery>,
) -> Result<Json<Vec<Transcript>>, ApiError> {
    Ok(Json(transcript::list_for_meeting(&state.pool, auth.user.id, meeting_id, query.limit).await?))
}

/// `GET /transcripts/meeting/{id}/full`: one JSON string.
pub async fn full_transcript(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(meeting_id): Path<Uuid>,
) -> Result<Json<String>, ApiError> {
    Ok(Json(transcript::full_transcript(&state.pool, auth.user.id, meeting_id).await?))
}

/// `DELETE /transcripts/{id}`
pub async fn delete_transcript(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(transcript_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    transcript::delete_transcript(&state.pool, auth.user.id, transcript_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
