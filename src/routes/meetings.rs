//! Meeting routes: CRUD, instant rooms, live start/stop, summaries, and the
//! bot's participant hooks.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::auth::{AuthUser, BotKeyQuery, require_bot_key, require_role};
use super::error::ApiError;
use crate::services::auth::Role;
use crate::services::meeting::{
    self, InstantMeeting, Meeting, MeetingDetail, NewMeeting, ParticipantEvent, ScheduleMeeting, StartMeeting,
};
use crate::services::summary;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MeetingListQuery {
    #[serde(default)]
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct StartInstantBody {
    pub project_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateSummaryBody {
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ParticipantLeaveBody {
    #[serde(alias = "id")]
    pub participant_id: String,
}

/// `POST /meetings`
pub async fn create_meeting(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<NewMeeting>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let meeting = meeting::create_meeting(&state.pool, auth.user.id, body).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": meeting.id, "meeting_id": meeting.id }))))
}

/// `GET /meetings?project_id`
pub async fn list_meetings(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<MeetingListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let meetings = meeting::list_meetings(&state.pool, auth.user.id, query.project_id).await?;
    Ok(Json(json!({ "meetings": meetings })))
}

/// `POST /meetings/start-instant`: managers only.
pub async fn start_instant(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<StartInstantBody>,
) -> Result<(StatusCode, Json<InstantMeeting>), ApiError> {
    require_role(&auth, &[Role::Manager])?;
    let instant = meeting::start_instant(&state.pool, &state.config.jitsi_domain, auth.user.id, body.project_id).await?;
    Ok((StatusCode::CREATED, Json(instant)))
}

/// `POST /meetings/schedule`: managers only.
pub async fn schedule_meeting(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<ScheduleMeeting>,
) -> Result<(StatusCode, Json<Meeting>), ApiError> {
    require_role(&auth, &[Role::Manager])?;
    let scheduled = meeting::schedule_meeting(&state.pool, auth.user.id, body).await?;
    Ok((StatusCode::CREATED, Json(scheduled)))
}

/// `GET /meetings/{id}`
pub async fn get_meeting(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(meeting_id): Path<Uuid>,
) -> Result<Json<MeetingDetail>, ApiError> {
    Ok(Json(meeting::meeting_detail(&state.pool, meeting_id, auth.user.id).await?))
}

/// `POST /meetings/{id}/start`
pub async fn start_meeting(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(meeting_id): Path<Uuid>,
    body: Option<Json<StartMeeting>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    meeting::start_live(&state, meeting_id, auth.user.id, body).await?;
    Ok(Json(json!({ "message": "Meeting started", "meeting_id": meeting_id })))
}

/// `POST /meetings/{id}/stop`
pub async fn stop_meeting(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(meeting_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    meeting::stop_live(&state, meeting_id, auth.user.id).await?;
    Ok(Json(json!({ "message": "Meeting stopped", "meeting_id": meeting_id })))
}

/// `POST /meetings/{id}/generate-summary`
pub async fn generate_summary(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(meeting_id): Path<Uuid>,
    body: Option<Json<GenerateSummaryBody>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    meeting::require_access(&state.pool, meeting_id, auth.user.id).await?;
    state.rate_limiter.check_and_record(auth.user.id)?;

    let language = body
        .and_then(|Json(b)| b.language)
        .map(|l| l.trim().to_owned())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| summary::DEFAULT_LANGUAGE.to_owned());
    let stored = summary::summarize_meeting(&state, meeting_id, &language).await?;
    let action_items = summary::list_action_items(&state.pool, meeting_id).await?;

    let message = if stored.is_some() { "Summary generated" } else { "No transcript to summarize" };
    Ok(Json(json!({
        "message": message,
        "meeting_id": meeting_id,
        "summary": stored,
        "action_items": action_items,
    })))
}

// =============================================================================
// BOT HOOKS
// =============================================================================

/// `POST /meetings/{id}/participants/join`
pub async fn participant_join(
    State(state): State<AppState>,
    Path(meeting_id): Path<Uuid>,
    Query(query): Query<BotKeyQuery>,
    Json(body): Json<ParticipantEvent>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_bot_key(&state, query.key.as_deref())?;
    meeting::participant_joined(&state, meeting_id, &body).await?;
    Ok(Json(json!({ "message": "ok", "participant_id": body.participant_id })))
}

/// `POST /meetings/{id}/participants/leave`
pub async fn participant_leave(
    State(state): State<AppState>,
    Path(meeting_id): Path<Uuid>,
    Query(query): Query<BotKeyQuery>,
    Json(body): Json<ParticipantLeaveBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_bot_key(&state, query.key.as_deref())?;
    meeting::participant_left(&state, meeting_id, &body.participant_id).await?;
    Ok(Json(json!({ "message": "ok", "participant_id": body.participant_id })))
}
