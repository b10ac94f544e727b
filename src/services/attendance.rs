//! Attendance: signed-in users and bot-reported conference participants.
//!
//! Two tables back this module. `attendance` holds one row per (meeting, user)
//! for dashboard users; a rejoin reopens the row. `attendance_records` is
//! append-only and holds what the bot sees in the conference, where
//! participant ids are opaque strings and the same person may join and
//! leave many times.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::meeting::{self, MeetingError};

const LIST_LIMIT: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("Attendance record not found")]
    NotFound,
    #[error("Not allowed to modify this attendance record")]
    Forbidden,
    #[error(transparent)]
    Meeting(#[from] MeetingError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Attendance {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub left_at: Option<OffsetDateTime>,
    /// Seconds.
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAttendance {
    pub meeting_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttendanceUpdate {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub left_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ParticipantRecord {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub participant_id: String,
    pub display_name: String,
    pub meeting_role: String,
    #[serde(with = "time::serde::rfc3339")]
    pub join_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub leave_time: Option<OffsetDateTime>,
    pub duration_seconds: Option<i64>,
}

const ATTENDANCE_COLUMNS: &str = "id, meeting_id, user_id, joined_at, left_at, duration";
const PARTICIPANT_COLUMNS: &str =
    "id, meeting_id, participant_id, display_name, meeting_role, join_time, leave_time, duration_seconds";

#[must_use]
pub fn duration_seconds(joined_at: OffsetDateTime, left_at: OffsetDateTime) -> i64 {
    (left_at - joined_at).whole_seconds().max(0)
}

/// Apply an update in memory. A `left_at` always recomputes `duration`.
pub(crate) fn apply_update(record: &mut Attendance, update: &AttendanceUpdate) {
    if let Some(duration) = update.duration {
        record.duration = Some(duration.max(0));
    }
    if let Some(left_at) = update.left_at {
        record.left_at = Some(left_at);
        record.duration = Some(duration_seconds(record.joined_at, left_at));
    }
}

// =============================================================================
// USER ATTENDANCE
// =============================================================================

async fn upsert(pool: &PgPool, meeting_id: Uuid, user_id: Uuid, joined_at: OffsetDateTime) -> Result<Attendance, sqlx::Error> {
    sqlx::query_as::<_, Attendance>(&format!(
        "INSERT INTO attendance (id, meeting_id, user_id, joined_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (meeting_id, user_id)
         DO UPDATE SET joined_at = EXCLUDED.joined_at, left_at = NULL, duration = NULL
         RETURNING {ATTENDANCE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(meeting_id)
    .bind(user_id)
    .bind(joined_at)
    .fetch_one(pool)
    .await
}

async fn find_for_user(pool: &PgPool, meeting_id: Uuid, user_id: Uuid) -> Result<Option<Attendance>, sqlx::Error> {
    sqlx::query_as::<_, Attendance>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE meeting_id = $1 AND user_id = $2"
    ))
    .bind(meeting_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

async fn save(pool: &PgPool, record: &Attendance) -> Result<Attendance, sqlx::Error> {
    sqlx::query_as::<_, Attendance>(&format!(
        "UPDATE attendance SET left_at = $2, duration = $3 WHERE id = $1 RETURNING {ATTENDANCE_COLUMNS}"
    ))
    .bind(record.id)
    .bind(record.left_at)
    .bind(record.duration)
    .fetch_one(pool)
    .await
}

/// Record the caller's join time. A rejoin resets `left_at` and `duration`.
pub async fn record_attendance(pool: &PgPool, user_id: Uuid, input: NewAttendance) -> Result<Attendance, AttendanceError> {
    meeting::require_access(pool, input.meeting_id, user_id).await?;
    Ok(upsert(pool, input.meeting_id, user_id, input.joined_at).await?)
}

/// Update the caller's own record.
pub async fn update_attendance(
    pool: &PgPool,
    user_id: Uuid,
    attendance_id: Uuid,
    update: AttendanceUpdate,
) -> Result<Attendance, AttendanceError> {
    let mut record = sqlx::query_as::<_, Attendance>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = $1"
    ))
    .bind(attendance_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AttendanceError::NotFound)?;
    meeting::require_access(pool, record.meeting_id, user_id).await?;
    if record.user_id != user_id {
        return Err(AttendanceError::Forbidden);
    }
    apply_update(&mut record, &update);
    Ok(save(pool, &record).await?)
}

/// Mark the caller present now. An already-open record is returned as is.
pub async fn join_meeting(pool: &PgPool, user_id: Uuid, meeting_id: Uuid) -> Result<Attendance, AttendanceError> {
    meeting::require_access(pool, meeting_id, user_id).await?;
    if let Some(record) = find_for_user(pool, meeting_id, user_id).await? {
        if record.left_at.is_none() {
            return Ok(record);
        }
    }
    Ok(upsert(pool, meeting_id, user_id, OffsetDateTime::now_utc()).await?)
}

/// Mark the caller gone now. An already-closed record is returned as is.
pub async fn leave_meeting(pool: &PgPool, user_id: Uuid, meeting_id: Uuid) -> Result<Attendance, AttendanceError> {
    meeting::require_access(pool, meeting_id, user_id).await?;
    let mut record = find_for_user(pool, meeting_id, user_id)
        .await?
        .ok_or(AttendanceError::NotFound)?;
    if record.left_at.is_some() {
        return Ok(record);
    }
    apply_update(&mut record, &AttendanceUpdate { left_at: Some(OffsetDateTime::now_utc()), duration: None });
    Ok(save(pool, &record).await?)
}

pub async fn list_for_meeting(pool: &PgPool, user_id: Uuid, meeting_id: Uuid) -> Result<Vec<Attendance>, AttendanceError> {
    meeting::require_access(pool, meeting_id, user_id).await?;
    let records = sqlx::query_as::<_, Attendance>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE meeting_id = $1 ORDER BY joined_at LIMIT $2"
    ))
    .bind(meeting_id)
    .bind(LIST_LIMIT)
    .fetch_all(pool)
    .await?;
    Ok(records)
}

// =============================================================================
// CONFERENCE PARTICIPANTS
// =============================================================================

pub async fn participant_join(
    pool: &PgPool,
    meeting_id: Uuid,
    participant_id: &str,
    display_name: &str,
    meeting_role: &str,
) -> Result<ParticipantRecord, sqlx::Error> {
    sqlx::query_as::<_, ParticipantRecord>(&format!(
        "INSERT INTO attendance_records (id, meeting_id, participant_id, display_name, meeting_role)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {PARTICIPANT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(meeting_id)
    .bind(participant_id)
    .bind(display_name)
    .bind(meeting_role)
    .fetch_one(pool)
    .await
}

/// Close the participant's most recent open record. `None` when nothing was open.
pub async fn participant_leave(
    pool: &PgPool,
    meeting_id: Uuid,
    participant_id: &str,
) -> Result<Option<ParticipantRecord>, sqlx::Error> {
    sqlx::query_as::<_, ParticipantRecord>(&format!(
        "UPDATE attendance_records
         SET leave_time = now(),
             duration_seconds = GREATEST(0, EXTRACT(EPOCH FROM (now() - join_time)))::bigint
         WHERE id = (
             SELECT id FROM attendance_records
             WHERE meeting_id = $1 AND participant_id = $2 AND leave_time IS NULL
             ORDER BY join_time DESC
             LIMIT 1
         )
         RETURNING {PARTICIPANT_COLUMNS}"
    ))
    .bind(meeting_id)
    .bind(participant_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_participants(pool: &PgPool, meeting_id: Uuid) -> Result<Vec<ParticipantRecord>, sqlx::Error> {
    sqlx::query_as::<_, ParticipantRecord>(&format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM attendance_records WHERE meeting_id = $1 ORDER BY join_time"
    ))
    .bind(meeting_id)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
#[path = "attendance_test.rs"]
mod tests;
