//! Summary service: transcript → overview, key points, decisions, action items.
//!
//! DESIGN
//! ======
//! The model is asked for a single JSON object. Models are inconsistent about
//! the exact shape, so parsing is lenient about everything except the JSON
//! itself: fences are stripped, missing or non-list fields become empty
//! lists, and a bare string where a list was expected becomes one item.
//!
//! Regenerating a meeting summary replaces its action items, so the meeting
//! page always reflects the latest run.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::transcript;
use crate::llm::LlmChat;
use crate::llm::types::{ChatRequest, LlmError, Message};
use crate::state::AppState;

pub const DEFAULT_LANGUAGE: &str = "en";
pub const MAX_TRANSCRIPT_CHARS: usize = 120_000;
const SUMMARY_MAX_TOKENS: u32 = 2048;

const SUMMARY_SYSTEM_PROMPT: &str = "You summarize meeting transcripts. \
Respond with a single JSON object and nothing else, using exactly these keys:\n\
- \"overview\": a short paragraph describing what the meeting covered\n\
- \"key_points\": list of the main discussion points\n\
- \"decisions\": list of decisions that were made\n\
- \"action_items\": list of concrete follow-up tasks, each naming an owner when one was mentioned\n\
Use empty lists when nothing applies. Do not invent content that is not in the transcript.";

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("AI features are not configured")]
    NotConfigured,
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("invalid summary JSON: {0}")]
    InvalidJson(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryResult {
    pub overview: String,
    pub key_points: Vec<String>,
    pub decisions: Vec<String>,
    pub action_items: Vec<String>,
}

impl SummaryResult {
    /// Overview followed by the decisions, as stored in `summary_text`.
    #[must_use]
    pub fn summary_text(&self) -> String {
        if self.decisions.is_empty() {
            return self.overview.clone();
        }
        let mut text = self.overview.clone();
        text.push_str("\n\nDecisions:");
        for decision in &self.decisions {
            text.push_str("\n- ");
            text.push_str(decision);
        }
        text
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredSummary {
    pub summary_text: String,
    pub key_points: Value,
    pub language: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActionItem {
    pub id: Uuid,
    pub text: String,
    pub status: String,
}

// =============================================================================
// PARSING
// =============================================================================

/// Cut `text` to at most `max_chars` characters.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    text.char_indices().nth(max_chars).map_or(text, |(idx, _)| &text[..idx])
}

/// Remove a surrounding Markdown code fence, with or without a language tag.
#[must_use]
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn item_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Object(map) => ["text", "title", "task", "description"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map_or_else(|| value.to_string(), |s| s.trim().to_owned()),
        Value::Null => return None,
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Lists pass through; a scalar becomes one item when `wrap_scalar`; anything
/// else is empty.
fn string_list(value: Option<&Value>, wrap_scalar: bool) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(item_text).collect(),
        Some(scalar @ (Value::String(_) | Value::Object(_))) if wrap_scalar => item_text(scalar).into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Parse the model's reply into a [`SummaryResult`].
///
/// # Errors
///
/// Returns [`SummaryError::InvalidJson`] when the reply is not a JSON object.
pub fn parse_summary(raw: &str) -> Result<SummaryResult, SummaryError> {
    let body = strip_code_fences(raw);
    let value: Value = serde_json::from_str(body).map_err(|e| SummaryError::InvalidJson(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(SummaryError::InvalidJson("expected a JSON object".into()));
    };
    Ok(SummaryResult {
        overview: map
            .get("overview")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_owned(),
        key_points: string_list(map.get("key_points"), false),
        decisions: string_list(map.get("decisions"), false),
        action_items: string_list(map.get("action_items"), true),
    })
}

// =============================================================================
// LLM CALL
// =============================================================================

/// Summarize a transcript, optionally in a specific language.
pub async fn summarize(llm: &dyn LlmChat, transcript: &str, language: &str) -> Result<SummaryResult, SummaryError> {
    let body = truncate_chars(transcript, MAX_TRANSCRIPT_CHARS);
    let system = format!("{SUMMARY_SYSTEM_PROMPT}\nWrite all text values in the language with code \"{language}\".");
    let messages = [Message::user(format!("Transcript:\n{body}"))];
    let response = llm.chat(ChatRequest::json(SUMMARY_MAX_TOKENS, &system, &messages)).await?;
    info!(
        input_tokens = response.input_tokens,
        output_tokens = response.output_tokens,
        "summary: llm response"
    );
    if response.truncated() {
        warn!(max_tokens = SUMMARY_MAX_TOKENS, "summary: reply hit the token limit");
    }
    parse_summary(&response.text())
}

pub(crate) fn require_llm(state: &AppState) -> Result<Arc<dyn LlmChat>, SummaryError> {
    state.llm.clone().ok_or(SummaryError::NotConfigured)
}

// =============================================================================
// MEETING SUMMARIES
// =============================================================================

/// Summarize the meeting's STT segments and store the result. `Ok(None)` when
/// there is nothing to summarize.
pub async fn summarize_meeting(
    state: &AppState,
    meeting_id: Uuid,
    language: &str,
) -> Result<Option<StoredSummary>, SummaryError> {
    let llm = require_llm(state)?;
    let segments = transcript::list_segments(&state.pool, meeting_id).await?;
    let text = segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        return Ok(None);
    }

    let result = summarize(llm.as_ref(), &text, language).await?;
    let stored = store_summary(&state.pool, meeting_id, &result, language).await?;
    info!(%meeting_id, action_items = result.action_items.len(), "meeting summary stored");
    Ok(Some(stored))
}

/// Like [`summarize_meeting`], but failures are logged instead of returned.
pub async fn summarize_meeting_logged(state: &AppState, meeting_id: Uuid, language: &str) {
    match summarize_meeting(state, meeting_id, language).await {
        Ok(Some(_)) => {}
        Ok(None) => debug!(%meeting_id, "no transcript to summarize"),
        Err(SummaryError::NotConfigured) => debug!(%meeting_id, "llm not configured; skipping summary"),
        Err(e) => warn!(%meeting_id, error = %e, "meeting summary failed"),
    }
}

async fn store_summary(
    pool: &PgPool,
    meeting_id: Uuid,
    result: &SummaryResult,
    language: &str,
) -> Result<StoredSummary, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let stored = sqlx::query_as::<_, StoredSummary>(
        "INSERT INTO summaries (id, meeting_id, summary_text, key_points, language)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING summary_text, key_points, language, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(meeting_id)
    .bind(result.summary_text())
    .bind(Value::from(result.key_points.clone()))
    .bind(language)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM action_items WHERE meeting_id = $1")
        .bind(meeting_id)
        .execute(&mut *tx)
        .await?;
    for item in &result.action_items {
        sqlx::query("INSERT INTO action_items (id, meeting_id, text, status, created_at)
             VALUES ($1, $2, $3, 'pending', clock_timestamp())")
            .bind(Uuid::new_v4())
            .bind(meeting_id)
            .bind(item)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(stored)
}

pub async fn latest_summary(pool: &PgPool, meeting_id: Uuid) -> Result<Option<StoredSummary>, sqlx::Error> {
    sqlx::query_as::<_, StoredSummary>(
        "SELECT summary_text, key_points, language, created_at FROM summaries
         WHERE meeting_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(meeting_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_action_items(pool: &PgPool, meeting_id: Uuid) -> Result<Vec<ActionItem>, sqlx::Error> {
    sqlx::query_as::<_, ActionItem>("SELECT id, text, status FROM action_items WHERE meeting_id = $1 ORDER BY created_at")
        .bind(meeting_id)
        .fetch_all(pool)
        .await
}

#[cfg(test)]
#[path = "summary_test.rs"]
mod tests;
