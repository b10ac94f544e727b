//! Meeting service: scheduling, instant rooms, and the live lifecycle.
//!
//! DESIGN
//! ======
//! A meeting row moves `scheduled → live → ended`. Going live wires up the
//! in-memory pieces (STT pipeline, bot); ending tears them down in reverse
//! order so the last buffered audio is transcribed before the summary runs:
//!
//! 1. stop the bot (no more audio arrives)
//! 2. flush the STT pipeline (remaining audio → transcript)
//! 3. mark the row ended
//! 4. summarize
//!
//! Meetings without a project are private to their creator.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::attendance::{self, ParticipantRecord};
use super::bot::BotStart;
use super::project::{self, ProjectError};
use super::summary::{self, ActionItem, StoredSummary};
use super::transcript::{self, TimedText};
use super::{room, stt};
use crate::state::AppState;

const LIST_LIMIT: i64 = 100;
const DEFAULT_TITLE: &str = "Meeting";
const BOT_PARTICIPANT_ID: &str = "bot";
const BOT_MEETING_ROLE: &str = "bot";

#[derive(Debug, thiserror::Error)]
pub enum MeetingError {
    #[error("Meeting not found")]
    NotFound,
    #[error("Access denied to meeting")]
    Forbidden,
    #[error("meeting_url required to start bot")]
    MissingMeetingUrl,
    #[error("Could not allocate a room name")]
    RoomNameTaken,
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingKind {
    Instant,
    Scheduled,
}

impl MeetingKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::Scheduled => "scheduled",
        }
    }
}

impl TryFrom<String> for MeetingKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "instant" => Ok(Self::Instant),
            "scheduled" => Ok(Self::Scheduled),
            _ => Err(format!("unknown meeting type: {value}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Scheduled,
    Live,
    Ended,
}

impl TryFrom<String> for MeetingStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "live" => Ok(Self::Live),
            "ended" => Ok(Self::Ended),
            _ => Err(format!("unknown meeting status: {value}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Meeting {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub room_name: Option<String>,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub kind: MeetingKind,
    #[sqlx(try_from = "String")]
    pub status: MeetingStatus,
    pub meeting_url: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    pub created_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMeeting {
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub meeting_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleMeeting {
    pub project_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartMeeting {
    #[serde(default)]
    pub meeting_url: Option<String>,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstantMeeting {
    pub meeting_id: Uuid,
    pub room_name: String,
    pub jitsi_url: String,
}

/// Participant reported by the bot. Runners disagree on field names.
#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantEvent {
    #[serde(alias = "id")]
    pub participant_id: String,
    #[serde(default, alias = "display_name")]
    pub name: Option<String>,
    #[serde(default)]
    pub meeting_role: Option<String>,
}

impl ParticipantEvent {
    fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.participant_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MeetingDetail {
    pub meeting: Meeting,
    pub transcript_segments: Vec<TimedText>,
    pub transcripts: Vec<TimedText>,
    pub attendance: Vec<ParticipantRecord>,
    pub summary: Option<StoredSummary>,
    pub action_items: Vec<ActionItem>,
    pub total_participants: usize,
    pub total_duration: Option<i64>,
}

const MEETING_COLUMNS: &str = "id, project_id, title, room_name, kind, status, meeting_url, start_time, \
     started_at, ended_at, created_by, created_at";

// =============================================================================
// HELPERS
// =============================================================================

/// `mm-{project_id}-{12 hex}`, unique per instant meeting.
#[must_use]
pub fn generate_room_name(project_id: Uuid) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("mm-{project_id}-{}", &suffix[..12])
}

#[must_use]
pub fn jitsi_url(domain: &str, room_name: &str) -> String {
    format!("{}/{room_name}", domain.trim_end_matches('/'))
}

fn clean_title(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TITLE)
        .to_owned()
}

fn clean_url(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|u| !u.is_empty()).map(str::to_owned)
}

/// Seconds between start and end, when both are known.
#[must_use]
pub fn total_duration(meeting: &Meeting) -> Option<i64> {
    match (meeting.started_at, meeting.ended_at) {
        (Some(start), Some(end)) => Some((end - start).whole_seconds().max(0)),
        _ => None,
    }
}

/// Number of distinct participants across all attendance records.
#[must_use]
pub fn distinct_participants(records: &[ParticipantRecord]) -> usize {
    let mut ids: Vec<&str> = records.iter().map(|r| r.participant_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.len()
}

// =============================================================================
// ACCESS
// =============================================================================

pub async fn find_meeting(pool: &PgPool, meeting_id: Uuid) -> Result<Option<Meeting>, sqlx::Error> {
    sqlx::query_as::<_, Meeting>(&format!("SELECT {MEETING_COLUMNS} FROM meetings WHERE id = $1"))
        .bind(meeting_id)
        .fetch_optional(pool)
        .await
}

/// Project members may see a project meeting; only the creator sees a private one.
pub async fn check_access(pool: &PgPool, meeting: &Meeting, user_id: Uuid) -> Result<(), MeetingError> {
    match meeting.project_id {
        Some(project_id) => {
            project::require_member(pool, project_id, user_id).await?;
            Ok(())
        }
        None if meeting.created_by == Some(user_id) => Ok(()),
        None => Err(MeetingError::Forbidden),
    }
}

pub async fn require_access(pool: &PgPool, meeting_id: Uuid, user_id: Uuid) -> Result<Meeting, MeetingError> {
    let meeting = find_meeting(pool, meeting_id)
        .await?
        .ok_or(MeetingError::NotFound)?;
    check_access(pool, &meeting, user_id).await?;
    Ok(meeting)
}

// =============================================================================
// CRUD
// =============================================================================

pub async fn create_meeting(pool: &PgPool, user_id: Uuid, input: NewMeeting) -> Result<Meeting, MeetingError> {
    if let Some(project_id) = input.project_id {
        project::require_member(pool, project_id, user_id).await?;
    }
    let meeting = sqlx::query_as::<_, Meeting>(&format!(
        "INSERT INTO meetings (id, project_id, title, kind, status, meeting_url, created_by)
         VALUES ($1, $2, $3, 'scheduled', 'scheduled', $4, $5)
         RETURNING {MEETING_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(input.project_id)
    .bind(clean_title(input.title.as_deref()))
    .bind(clean_url(input.meeting_url.as_deref()))
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(meeting)
}

/// Meetings newest-start first. Without a project: the caller's projects plus
/// meetings they created.
pub async fn list_meetings(pool: &PgPool, user_id: Uuid, project_id: Option<Uuid>) -> Result<Vec<Meeting>, MeetingError> {
    let meetings = match project_id {
        Some(project_id) => {
            project::require_member(pool, project_id, user_id).await?;
            sqlx::query_as::<_, Meeting>(&format!(
                "SELECT {MEETING_COLUMNS} FROM meetings
                 WHERE project_id = $1
                 ORDER BY COALESCE(start_time, created_at) DESC
                 LIMIT $2"
            ))
            .bind(project_id)
            .bind(LIST_LIMIT)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Meeting>(&format!(
                "SELECT {MEETING_COLUMNS} FROM meetings
                 WHERE created_by = $1
                    OR project_id IN (SELECT project_id FROM project_members WHERE user_id = $1)
                 ORDER BY COALESCE(start_time, created_at) DESC
                 LIMIT $2"
            ))
            .bind(user_id)
            .bind(LIST_LIMIT)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(meetings)
}

/// Create a live instant meeting with a fresh conference room.
pub async fn start_instant(
    pool: &PgPool,
    jitsi_domain: &str,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<InstantMeeting, MeetingError> {
    project::require_member(pool, project_id, user_id).await?;

    for _ in 0..2 {
        let meeting_id = Uuid::new_v4();
        let room_name = generate_room_name(project_id);
        let url = jitsi_url(jitsi_domain, &room_name);
        let inserted = sqlx::query(
            "INSERT INTO meetings (id, project_id, title, room_name, kind, status, meeting_url, start_time, started_at, created_by)
             VALUES ($1, $2, $3, $4, 'instant', 'live', $5, now(), now(), $6)",
        )
        .bind(meeting_id)
        .bind(project_id)
        .bind(DEFAULT_TITLE)
        .bind(&room_name)
        .bind(&url)
        .bind(user_id)
        .execute(pool)
        .await;

        match inserted {
            Ok(_) => {
                info!(%meeting_id, %project_id, %room_name, "instant meeting started");
                return Ok(InstantMeeting { meeting_id, room_name, jitsi_url: url });
            }
            Err(e) if crate::db::is_unique_violation(&e) => {
                warn!(%project_id, %room_name, "room name collision, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(MeetingError::RoomNameTaken)
}

pub async fn schedule_meeting(pool: &PgPool, user_id: Uuid, input: ScheduleMeeting) -> Result<Meeting, MeetingError> {
    project::require_member(pool, input.project_id, user_id).await?;
    let meeting = sqlx::query_as::<_, Meeting>(&format!(
        "INSERT INTO meetings (id, project_id, title, kind, status, start_time, created_by)
         VALUES ($1, $2, $3, 'scheduled', 'scheduled', $4, $5)
         RETURNING {MEETING_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(input.project_id)
    .bind(clean_title(input.title.as_deref()))
    .bind(input.start_time)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(meeting)
}

/// Everything the meeting page shows in one response.
pub async fn meeting_detail(pool: &PgPool, meeting_id: Uuid, user_id: Uuid) -> Result<MeetingDetail, MeetingError> {
    let meeting = require_access(pool, meeting_id, user_id).await?;
    let transcript_segments = transcript::list_segments(pool, meeting_id).await?;
    let transcripts = transcript::list_timed(pool, meeting_id).await?;
    let attendance = attendance::list_participants(pool, meeting_id).await?;
    let summary = summary::latest_summary(pool, meeting_id).await?;
    let action_items = summary::list_action_items(pool, meeting_id).await?;

    Ok(MeetingDetail {
        total_participants: distinct_participants(&attendance),
        total_duration: total_duration(&meeting),
        meeting,
        transcript_segments,
        transcripts,
        attendance,
        summary,
        action_items,
    })
}

// =============================================================================
// LIVE LIFECYCLE
// =============================================================================

/// Take a meeting live: persist status, open the STT pipeline, launch the bot.
/// Unknown meeting ids are created on the fly.
pub async fn start_live(
    state: &AppState,
    meeting_id: Uuid,
    user_id: Uuid,
    input: StartMeeting,
) -> Result<Meeting, MeetingError> {
    let existing = find_meeting(&state.pool, meeting_id).await?;
    if let Some(meeting) = &existing {
        check_access(&state.pool, meeting, user_id).await?;
    }
    let meeting_url = clean_url(input.meeting_url.as_deref())
        .or_else(|| existing.as_ref().and_then(|m| m.meeting_url.clone()))
        .ok_or(MeetingError::MissingMeetingUrl)?;

    let meeting = match existing {
        Some(_) => {
            sqlx::query_as::<_, Meeting>(&format!(
                "UPDATE meetings
                 SET status = 'live',
                     meeting_url = $2,
                     started_at = CASE WHEN status = 'live' AND started_at IS NOT NULL THEN started_at ELSE now() END,
                     ended_at = NULL
                 WHERE id = $1
                 RETURNING {MEETING_COLUMNS}"
            ))
            .bind(meeting_id)
            .bind(&meeting_url)
            .fetch_one(&state.pool)
            .await?
        }
        None => {
            if let Some(project_id) = input.project_id {
                project::require_member(&state.pool, project_id, user_id).await?;
            }
            sqlx::query_as::<_, Meeting>(&format!(
                "INSERT INTO meetings (id, project_id, title, kind, status, meeting_url, start_time, started_at, created_by)
                 VALUES ($1, $2, $3, 'instant', 'live', $4, now(), now(), $5)
                 RETURNING {MEETING_COLUMNS}"
            ))
            .bind(meeting_id)
            .bind(input.project_id)
            .bind(clean_title(input.title.as_deref()))
            .bind(&meeting_url)
            .bind(user_id)
            .fetch_one(&state.pool)
            .await?
        }
    };

    stt::ensure_pipeline(state, meeting_id).await;

    match state.bots.start(meeting_id, &meeting_url) {
        Ok(BotStart::Started) => {
            if let Err(e) = attendance::participant_join(
                &state.pool,
                meeting_id,
                BOT_PARTICIPANT_ID,
                state.bots.bot_name(),
                BOT_MEETING_ROLE,
            )
            .await
            {
                warn!(%meeting_id, error = %e, "failed to record bot attendance");
            }
        }
        Ok(BotStart::AlreadyRunning) => {}
        Ok(BotStart::Disabled) => info!(%meeting_id, "bot disabled; meeting live without bot"),
        Err(e) => warn!(%meeting_id, error = %e, "bot launch failed; meeting live without bot"),
    }

    info!(%meeting_id, "meeting started");
    Ok(meeting)
}

/// End a live meeting and summarize what was said.
pub async fn stop_live(state: &AppState, meeting_id: Uuid, user_id: Uuid) -> Result<Meeting, MeetingError> {
    require_access(&state.pool, meeting_id, user_id).await?;

    state.bots.stop(meeting_id).await;
    // The bot may have exited on its own; its attendance row still needs closing.
    if let Err(e) = attendance::participant_leave(&state.pool, meeting_id, BOT_PARTICIPANT_ID).await {
        warn!(%meeting_id, error = %e, "failed to record bot leave");
    }

    stt::flush_pipeline(state, meeting_id).await;

    let meeting = sqlx::query_as::<_, Meeting>(&format!(
        "UPDATE meetings SET status = 'ended', ended_at = now() WHERE id = $1 RETURNING {MEETING_COLUMNS}"
    ))
    .bind(meeting_id)
    .fetch_one(&state.pool)
    .await?;

    summary::summarize_meeting_logged(state, meeting_id, summary::DEFAULT_LANGUAGE).await;

    info!(%meeting_id, "meeting stopped");
    Ok(meeting)
}

// =============================================================================
// BOT PARTICIPANT HOOKS
// =============================================================================

/// Record a participant join reported by the bot. Returns `false` when it
/// was a duplicate inside the dedupe window.
pub async fn participant_joined(
    state: &AppState,
    meeting_id: Uuid,
    event: &ParticipantEvent,
) -> Result<bool, MeetingError> {
    if find_meeting(&state.pool, meeting_id).await?.is_none() {
        return Err(MeetingError::NotFound);
    }
    let name = event.display_name();
    let role = event.meeting_role.as_deref().unwrap_or("participant");
    let recorded = join_once(state, meeting_id, &event.participant_id, name, || {
        attendance::participant_join(&state.pool, meeting_id, &event.participant_id, name, role)
    })
    .await?;
    Ok(recorded.is_some())
}

/// Run `write` unless the participant joined inside the dedupe window.
/// A failed write releases the dedupe slot so the bot's retry is recorded.
async fn join_once<T, E, F, Fut>(
    state: &AppState,
    meeting_id: Uuid,
    participant_id: &str,
    display_name: &str,
    write: F,
) -> Result<Option<T>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if !room::note_join(state, meeting_id, participant_id, display_name, OffsetDateTime::now_utc()).await {
        return Ok(None);
    }
    match write().await {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            room::forget_join(state, meeting_id, participant_id, display_name).await;
            Err(e)
        }
    }
}

/// Close the participant's latest open record.
pub async fn participant_left(
    state: &AppState,
    meeting_id: Uuid,
    participant_id: &str,
) -> Result<Option<ParticipantRecord>, MeetingError> {
    if find_meeting(&state.pool, meeting_id).await?.is_none() {
        return Err(MeetingError::NotFound);
    }
    Ok(attendance::participant_leave(&state.pool, meeting_id, participant_id).await?)
}

#[cfg(test)]
#[path = "meeting_test.rs"]
mod tests;
