//! Attendance routes: per-user join/leave records.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use crate::services::attendance::{self, Attendance, AttendanceUpdate, NewAttendance};
use crate::state::AppState;

/// `POST /attendance`
pub async fn record_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<NewAttendance>,
) -> Result<(StatusCode, Json<Attendance>), ApiError> {
    let record = attendance::record_attendance(&state.pool, auth.user.id, body).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `PATCH /attendance/{id}`
pub async fn update_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(attendance_id): Path<Uuid>,
    Json(body): Json<AttendanceUpdate>,
) -> Result<Json<Attendance>, ApiError> {
    Ok(Json(attendance::update_attendance(&state.pool, auth.user.id, attendance_id, body).await?))
}

/// `POST /attendance/meeting/{id}/join`
pub async fn join_meeting(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(meeting_id): Path<Uuid>,
) -> Result<Json<Attendance>, ApiError> {
    Ok(Json(attendance::join_meeting(&state.pool, auth.user.id, meeting_id).await?))
}

/// `POST /attendance/meeting/{id}/leave`
pub async fn leave_meeting(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(meeting_id): Path<Uuid>,
) -> Result<Json<Attendance>, ApiError> {
    Ok(Json(attendance::leave_meeting(&state.pool, auth.user.id, meeting_id).await?))
}

/// `GET /attendance/meeting/{id}`
pub async fn list_for_meeting(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(meeting_id): Path<Uuid>,
) -> Result<Json<Vec<Attendance>>, ApiError> {
    Ok(Json(attendance::list_for_meeting(&state.pool, auth.user.id, meeting_id).await?))
}
