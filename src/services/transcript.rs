//! Transcript storage.
//!
//! `transcripts` holds attributed lines (typed by a participant, produced by
//! the per-utterance bot endpoint, or emitted by the STT pipeline).
//! `transcript_segments` holds the raw STT text used for summaries.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::meeting::{self, MeetingError};

pub const DEFAULT_LIST_LIMIT: i64 = 1000;
const UNKNOWN_SPEAKER: &str = "Unknown";

#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("Transcript not found")]
    NotFound,
    #[error("Not allowed to delete this transcript")]
    Forbidden,
    #[error("Transcript text is required")]
    EmptyText,
    #[error(transparent)]
    Meeting(#[from] MeetingError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Where a transcript line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptSource {
    Manual,
    Participant,
    Stt,
    JitsiBot,
}

impl TranscriptSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Participant => "participant",
            Self::Stt => "stt",
            Self::JitsiBot => "jitsi_bot",
        }
    }
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Transcript {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub user_id: Option<Uuid>,
    pub display_name: Option<String>,
    pub text: String,
    pub source: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TimedText {
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTranscript {
    pub meeting_id: Uuid,
    pub text: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

/// A line to store, already attributed.
#[derive(Debug, Clone)]
pub struct TranscriptLine {
    pub meeting_id: Uuid,
    pub user_id: Option<Uuid>,
    pub display_name: Option<String>,
    pub text: String,
    pub source: TranscriptSource,
    pub timestamp: OffsetDateTime,
}

const TRANSCRIPT_COLUMNS: &str = "id, meeting_id, user_id, display_name, text, source, timestamp";

/// `[HH:MM:SS] Name: text`
#[must_use]
pub fn format_line(timestamp: OffsetDateTime, speaker: &str, text: &str) -> String {
    let (h, m, s) = timestamp.to_hms();
    format!("[{h:02}:{m:02}:{s:02}] {speaker}: {text}")
}

// =============================================================================
// STORAGE
// =============================================================================

pub async fn record_line(pool: &PgPool, line: &TranscriptLine) -> Result<Transcript, sqlx::Error> {
    sqlx::query_as::<_, Transcript>(&format!(
        "INSERT INTO transcripts (id, meeting_id, user_id, display_name, text, source, timestamp)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {TRANSCRIPT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(line.meeting_id)
    .bind(line.user_id)
    .bind(&line.display_name)
    .bind(&line.text)
    .bind(line.source.as_str())
    .bind(line.timestamp)
    .fetch_one(pool)
    .await
}

pub async fn record_segment(pool: &PgPool, meeting_id: Uuid, text: &str, timestamp: OffsetDateTime) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO transcript_segments (id, meeting_id, text, timestamp) VALUES ($1, $2, $3, $4)")
        .bind(Uuid::new_v4())
        .bind(meeting_id)
        .bind(text)
        .bind(timestamp)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_segments(pool: &PgPool, meeting_id: Uuid) -> Result<Vec<TimedText>, sqlx::Error> {
    sqlx::query_as::<_, TimedText>(
        "SELECT text, timestamp FROM transcript_segments WHERE meeting_id = $1 ORDER BY timestamp",
    )
    .bind(meeting_id)
    .fetch_all(pool)
    .await
}

pub async fn list_timed(pool: &PgPool, meeting_id: Uuid) -> Result<Vec<TimedText>, sqlx::Error> {
    sqlx::query_as::<_, TimedText>("SELECT text, timestamp FROM transcripts WHERE meeting_id = $1 ORDER BY timestamp")
        .bind(meeting_id)
        .fetch_all(pool)
        .await
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Store a line typed by the caller.
pub async fn create_transcript(pool: &PgPool, user_id: Uuid, input: NewTranscript) -> Result<Transcript, TranscriptError> {
    let text = input.text.trim();
    if text.is_empty() {
        return Err(TranscriptError::EmptyText);
    }
    meeting::require_access(pool, input.meeting_id, user_id).await?;
    let line = TranscriptLine {
        meeting_id: input.meeting_id,
        user_id: Some(user_id),
        display_name: None,
        text: text.to_owned(),
        source: TranscriptSource::Manual,
        timestamp: input.timestamp.unwrap_or_else(OffsetDateTime::now_utc),
    };
    Ok(record_line(pool, &line).await?)
}

pub async fn list_for_meeting(
    pool: &PgPool,
    user_id: Uuid,
    meeting_id: Uuid,
    limit: i64,
) -> Result<Vec<Transcript>, TranscriptError> {
    meeting::require_access(pool, meeting_id, user_id).await?;
    let lines = sqlx::query_as::<_, Transcript>(&format!(
        "SELECT {TRANSCRIPT_COLUMNS} FROM transcripts WHERE meeting_id = $1 ORDER BY timestamp LIMIT $2"
    ))
    .bind(meeting_id)
    .bind(limit.clamp(1, DEFAULT_LIST_LIMIT))
    .fetch_all(pool)
    .await?;
    Ok(lines)
}

/// The whole meeting as newline-separated `[HH:MM:SS] Name: text` lines.
pub async fn full_transcript(pool: &PgPool, user_id: Uuid, meeting_id: Uuid) -> Result<String, TranscriptError> {
    meeting::require_access(pool, meeting_id, user_id).await?;
    let rows: Vec<(OffsetDateTime, Option<String>, Option<String>, String)> = sqlx::query_as(
        r"SELECT t.timestamp, u.name, t.display_name, t.text
          FROM transcripts t
          LEFT JOIN users u ON u.id = t.user_id
          WHERE t.meeting_id = $1
          ORDER BY t.timestamp",
    )
    .bind(meeting_id)
    .fetch_all(pool)
    .await?;

    let lines: Vec<String> = rows
        .into_iter()
        .map(|(timestamp, user_name, display_name, text)| {
            let speaker = user_name.or(display_name).unwrap_or_else(|| UNKNOWN_SPEAKER.to_owned());
            format_line(timestamp, &speaker, &text)
        })
        .collect();
    Ok(lines.join("\n"))
}

/// Delete a line. Allowed for its author and the project owner.
pub async fn delete_transcript(pool: &PgPool, user_id: Uuid, transcript_id: Uuid) -> Result<(), TranscriptError> {
    let row: Option<(Uuid, Option<Uuid>)> = sqlx::query_as("SELECT meeting_id, user_id FROM transcripts WHERE id = $1")
        .bind(transcript_id)
        .fetch_optional(pool)
        .await?;
    let (meeting_id, author_id) = row.ok_or(TranscriptError::NotFound)?;

    let meeting = meeting::find_meeting(pool, meeting_id)
        .await?
        .ok_or(TranscriptError::NotFound)?;
    let is_author = author_id == Some(user_id);
    let is_owner = match meeting.project_id {
        Some(project_id) => {
            let owner: Option<Uuid> = sqlx::query_scalar("SELECT owner_id FROM projects WHERE id = $1")
                .bind(project_id)
                .fetch_optional(pool)
                .await?;
            owner == Some(user_id)
        }
        None => meeting.created_by == Some(user_id),
    };
    if !is_author && !is_owner {
        return Err(TranscriptError::Forbidden);
    }

    sqlx::query("DELETE FROM transcripts WHERE id = $1")
        .bind(transcript_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "transcript_test.rs"]
mod tests;
