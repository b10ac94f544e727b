//! Recording uploads: audio file → transcription → summary.
//!
//! DESIGN
//! ======
//! The row is inserted as `processing` before any check that can fail, so
//! every upload leaves a trace. Each failure path marks the row `failed`
//! with the reason, then returns the error for the route to map to a status.
//! Processing is synchronous within the request.

use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::project::{self, ProjectError};
use super::summary::{self, SummaryError};
use crate::llm::whisper::audio_file_name;
use crate::state::AppState;

pub const NO_SPEECH_TEXT: &str = "(No speech detected in the recording.)";
const LIST_LIMIT: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("Recording not found")]
    NotFound,
    #[error("Access denied to recording")]
    Forbidden,
    #[error("No file uploaded")]
    MissingFile,
    #[error("File too large. Maximum size is {max_mb} MB")]
    TooLarge { max_mb: usize },
    #[error("Speech-to-text and LLM must be configured to process recordings")]
    NotConfigured,
    #[error("Processing failed: {0}")]
    Processing(String),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Recording {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub file_name: String,
    pub status: String,
    pub transcription: Option<String>,
    pub summary: Option<Value>,
    /// Same content as `summary`; older dashboards read this name.
    pub summary_dict: Option<Value>,
    pub action_items: Value,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A fully received multipart upload.
#[derive(Debug, Clone)]
pub struct RecordingUpload {
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub title: Option<String>,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

const RECORDING_COLUMNS: &str = "id, user_id, project_id, title, file_name, status, transcription, summary, \
     summary AS summary_dict, action_items, error, created_at, updated_at";

fn default_title(title: Option<&str>, file_name: &str) -> String {
    title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(file_name)
        .to_owned()
}

fn max_mb(bytes: usize) -> usize {
    bytes / (1024 * 1024)
}

// =============================================================================
// STORAGE
// =============================================================================

async fn insert_processing(pool: &PgPool, upload: &RecordingUpload) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO recordings (id, user_id, project_id, title, file_name, status)
         VALUES ($1, $2, $3, $4, $5, 'processing')",
    )
    .bind(id)
    .bind(upload.user_id)
    .bind(upload.project_id)
    .bind(default_title(upload.title.as_deref(), &upload.file_name))
    .bind(&upload.file_name)
    .execute(pool)
    .await?;
    Ok(id)
}

async fn mark_failed(pool: &PgPool, recording_id: Uuid, reason: &str) {
    let result = sqlx::query("UPDATE recordings SET status = 'failed', error = $2, updated_at = now() WHERE id = $1")
        .bind(recording_id)
        .bind(reason)
        .execute(pool)
        .await;
    if let Err(e) = result {
        warn!(%recording_id, error = %e, "failed to mark recording failed");
    }
}

async fn mark_completed(
    pool: &PgPool,
    recording_id: Uuid,
    transcription: &str,
    summary: &summary::SummaryResult,
) -> Result<Recording, sqlx::Error> {
    let summary_json = serde_json::to_value(summary).unwrap_or(Value::Null);
    sqlx::query_as::<_, Recording>(&format!(
        "UPDATE recordings
         SET status = 'completed', transcription = $2, summary = $3, action_items = $4, error = NULL, updated_at = now()
         WHERE id = $1
         RETURNING {RECORDING_COLUMNS}"
    ))
    .bind(recording_id)
    .bind(transcription)
    .bind(summary_json)
    .bind(Value::from(summary.action_items.clone()))
    .fetch_one(pool)
    .await
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Store, transcribe, and summarize an uploaded recording.
pub async fn process_upload(state: &AppState, upload: RecordingUpload) -> Result<Recording, RecordingError> {
    if let Some(project_id) = upload.project_id {
        project::require_member(&state.pool, project_id, upload.user_id).await?;
    }
    let recording_id = insert_processing(&state.pool, &upload).await?;
    info!(%recording_id, bytes = upload.bytes.len(), file = %upload.file_name, "recording received");

    match transcribe_and_summarize(state, &upload).await {
        Ok((transcription, result)) => {
            let recording = mark_completed(&state.pool, recording_id, &transcription, &result).await?;
            info!(%recording_id, "recording processed");
            Ok(recording)
        }
        Err(e) => {
            warn!(%recording_id, error = %e, "recording processing failed");
            mark_failed(&state.pool, recording_id, &e.to_string()).await;
            Err(e)
        }
    }
}

/// Record an upload whose file overran the size cap as `failed`. The file
/// bytes are never buffered, so `upload.bytes` is empty.
pub async fn reject_oversized(state: &AppState, upload: &RecordingUpload) -> RecordingError {
    let err = RecordingError::TooLarge { max_mb: max_mb(state.config.max_upload_bytes) };
    if let Some(project_id) = upload.project_id {
        if let Err(e) = project::require_member(&state.pool, project_id, upload.user_id).await {
            return e.into();
        }
    }
    match insert_processing(&state.pool, upload).await {
        Ok(recording_id) => {
            warn!(%recording_id, file = %upload.file_name, "recording rejected: file too large");
            mark_failed(&state.pool, recording_id, &err.to_string()).await;
            err
        }
        Err(e) => e.into(),
    }
}

async fn transcribe_and_summarize(
    state: &AppState,
    upload: &RecordingUpload,
) -> Result<(String, summary::SummaryResult), RecordingError> {
    let max_bytes = state.config.max_upload_bytes;
    if upload.bytes.len() > max_bytes {
        return Err(RecordingError::TooLarge { max_mb: max_mb(max_bytes) });
    }
    let (Some(stt), Some(llm)) = (state.stt.clone(), state.llm.clone()) else {
        return Err(RecordingError::NotConfigured);
    };

    let text = stt
        .transcribe(upload.bytes.clone(), &audio_file_name(&upload.file_name))
        .await
        .map_err(|e| RecordingError::Processing(e.to_string()))?;
    let text = match text.trim() {
        "" => NO_SPEECH_TEXT.to_owned(),
        t => t.to_owned(),
    };

    let result = summary::summarize(llm.as_ref(), &text, summary::DEFAULT_LANGUAGE)
        .await
        .map_err(|e| match e {
            SummaryError::NotConfigured => RecordingError::NotConfigured,
            other => RecordingError::Processing(other.to_string()),
        })?;
    Ok((text, result))
}

/// The caller's recordings, newest first.
pub async fn list_recordings(pool: &PgPool, user_id: Uuid, project_id: Option<Uuid>) -> Result<Vec<Recording>, sqlx::Error> {
    sqlx::query_as::<_, Recording>(&format!(
        "SELECT {RECORDING_COLUMNS} FROM recordings
         WHERE user_id = $1 AND ($2::uuid IS NULL OR project_id = $2)
         ORDER BY created_at DESC
         LIMIT $3"
    ))
    .bind(user_id)
    .bind(project_id)
    .bind(LIST_LIMIT)
    .fetch_all(pool)
    .await
}

pub async fn get_recording(pool: &PgPool, user_id: Uuid, recording_id: Uuid) -> Result<Recording, RecordingError> {
    let recording = sqlx::query_as::<_, Recording>(&format!(
        "SELECT {RECORDING_COLUMNS} FROM recordings WHERE id = $1"
    ))
    .bind(recording_id)
    .fetch_optional(pool)
    .await?
    .ok_or(RecordingError::NotFound)?;
    if recording.user_id != user_id {
        return Err(RecordingError::Forbidden);
    }
    Ok(recording)
}

#[cfg(test)]
#[path = "recording_test.rs"]
mod tests;
