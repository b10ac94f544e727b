//! Task extraction: project transcripts → task board updates.
//!
//! DESIGN
//! ======
//! All STT segments of a project's meetings are concatenated and sent to the
//! model, which answers with the five board columns, each a list of task
//! items. Every item is matched against the project's existing tasks by
//! title similarity (Ratcliff/Obershelp on normalized titles). A match
//! updates the existing task in place; anything else becomes a new
//! auto-generated task. New tasks join the candidate list immediately, so
//! one reply cannot create the same task twice.

use serde_json::{Map, Value};
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::project::{self, MemberDetail, ProjectError};
use super::summary::{MAX_TRANSCRIPT_CHARS, strip_code_fences, truncate_chars};
use super::task::{self, Task, TaskDraft, TaskPriority, TaskStatus, parse_deadline};
use crate::llm::LlmChat;
use crate::llm::types::{ChatRequest, LlmError, Message};
use crate::state::AppState;

pub const MATCH_THRESHOLD: f64 = 0.75;
pub const MIN_TRANSCRIPT_CHARS: usize = 50;
const EXTRACT_MAX_TOKENS: u32 = 4096;

const EXTRACT_SYSTEM_PROMPT: &str = "You maintain a team task board from meeting transcripts. \
Respond with a single JSON object and nothing else. It must have exactly these keys: \
\"todo\", \"in_progress\", \"in_review\", \"done\", \"blockers\". \
Each value is a list of tasks discussed in the transcript that belong in that column. \
Each task is an object with \"title\" (short, imperative) and optionally \"description\", \
\"owner\" (the person responsible, as named in the transcript), \"deadline\" (YYYY-MM-DD) \
and \"subtasks\" (list of short strings). Use empty lists for columns with no tasks. \
Only include tasks that were actually discussed.";

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("AI features are not configured")]
    NotConfigured,
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("invalid task JSON: {0}")]
    InvalidJson(String),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedTask {
    pub status: TaskStatus,
    pub title: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub deadline: Option<OffsetDateTime>,
    pub subtasks: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOutcome {
    pub created: usize,
    pub updated: usize,
    /// `false` when the transcript was too short to bother the model.
    pub ran: bool,
}

impl ExtractOutcome {
    #[must_use]
    pub fn message(&self) -> String {
        if self.ran {
            format!("Extracted {} new tasks and updated {} existing tasks", self.created, self.updated)
        } else {
            "Not enough transcript content to extract tasks".to_owned()
        }
    }
}

// =============================================================================
// SIMILARITY
// =============================================================================

/// Trim, lowercase, and collapse internal whitespace.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Ratcliff/Obershelp similarity: `2 * matches / (len(a) + len(b))`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, len) = longest_common_run(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + len..], &b[j + len..])
}

/// Longest common substring as `(start_a, start_b, len)`; earliest wins ties.
fn longest_common_run(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0_usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        let mut cur = vec![0_usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                let run = prev[j] + 1;
                cur[j + 1] = run;
                if run > best.2 {
                    best = (i + 1 - run, j + 1 - run, run);
                }
            }
        }
        prev = cur;
    }
    best
}

/// Index of the most similar existing title at or above [`MATCH_THRESHOLD`].
#[must_use]
pub fn best_match(title: &str, existing: &[Task]) -> Option<usize> {
    let needle = normalize_title(title);
    existing
        .iter()
        .enumerate()
        .map(|(idx, task)| (idx, similarity(&needle, &normalize_title(&task.title))))
        .filter(|(_, score)| *score >= MATCH_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(idx, _)| idx)
}

// =============================================================================
// PARSING
// =============================================================================

fn opt_string(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn parse_item(status: TaskStatus, item: &Value) -> Option<ExtractedTask> {
    match item {
        Value::String(title) if !title.trim().is_empty() => Some(ExtractedTask {
            status,
            title: title.trim().to_owned(),
            description: None,
            owner: None,
            deadline: None,
            subtasks: Vec::new(),
        }),
        Value::Object(map) => Some(ExtractedTask {
            status,
            title: opt_string(map, "title")?,
            description: opt_string(map, "description"),
            owner: opt_string(map, "owner"),
            deadline: opt_string(map, "deadline").as_deref().and_then(parse_deadline),
            subtasks: match map.get("subtasks") {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            },
        }),
        _ => None,
    }
}

/// Parse the model's board reply. Unknown column names are skipped.
///
/// # Errors
///
/// Returns [`ExtractError::InvalidJson`] when the reply is not a JSON object.
pub fn parse_extraction(raw: &str) -> Result<Vec<ExtractedTask>, ExtractError> {
    let value: Value =
        serde_json::from_str(strip_code_fences(raw)).map_err(|e| ExtractError::InvalidJson(e.to_string()))?;
    let Value::Object(columns) = value else {
        return Err(ExtractError::InvalidJson("expected a JSON object".into()));
    };

    let mut tasks = Vec::new();
    for (column, items) in &columns {
        let Some(status) = TaskStatus::normalize(column) else {
            continue;
        };
        let Value::Array(items) = items else {
            continue;
        };
        tasks.extend(items.iter().filter_map(|item| parse_item(status, item)));
    }
    Ok(tasks)
}

// =============================================================================
// APPLY
// =============================================================================

fn resolve_owner(owner: Option<&str>, members: &[MemberDetail]) -> Option<Uuid> {
    let owner = owner?.trim().to_lowercase();
    members
        .iter()
        .find(|m| m.name.to_lowercase() == owner || m.email.to_lowercase() == owner)
        .or_else(|| {
            members
                .iter()
                .find(|m| m.name.split_whitespace().next().is_some_and(|first| first.to_lowercase() == owner))
        })
        .map(|m| m.id)
}

/// Merge an extracted item into an existing task. Returns `true` when anything changed.
pub(crate) fn merge_into(task: &mut Task, item: &ExtractedTask, assignee: Option<Uuid>, now: OffsetDateTime) -> bool {
    let before = (task.status, task.description.clone(), task.subtasks.clone(), task.due_date, task.assignee_id);

    if task.status != item.status {
        task.status = item.status;
        if item.status == TaskStatus::Done && task.completed_at.is_none() {
            task.completed_at = Some(now);
        }
    }
    if let Some(description) = &item.description {
        task.description = Some(description.clone());
    }
    if !item.subtasks.is_empty() {
        task.subtasks = Value::Array(item.subtasks.clone());
    }
    if let Some(deadline) = item.deadline {
        task.due_date = Some(deadline);
    }
    if task.assignee_id.is_none() {
        task.assignee_id = assignee;
    }

    let changed = before != (task.status, task.description.clone(), task.subtasks.clone(), task.due_date, task.assignee_id);
    if changed {
        task.updated_at = now;
    }
    changed
}

async fn apply_extraction(
    pool: &PgPool,
    project_id: Uuid,
    items: &[ExtractedTask],
    members: &[MemberDetail],
) -> Result<ExtractOutcome, sqlx::Error> {
    let mut existing = task::list_for_project(pool, project_id).await?;
    let mut outcome = ExtractOutcome { ran: true, ..ExtractOutcome::default() };

    for item in items {
        let assignee = resolve_owner(item.owner.as_deref(), members);
        if let Some(idx) = best_match(&item.title, &existing) {
            let now = OffsetDateTime::now_utc();
            if merge_into(&mut existing[idx], item, assignee, now) {
                existing[idx] = task::save_task(pool, &existing[idx]).await?;
                outcome.updated += 1;
            }
            continue;
        }

        let draft = TaskDraft {
            project_id,
            title: item.title.clone(),
            description: item.description.clone(),
            status: item.status,
            priority: TaskPriority::default(),
            assignee_id: assignee,
            due_date: item.deadline,
            subtasks: Value::Array(item.subtasks.clone()),
            source_meeting_id: None,
            is_auto_generated: true,
        };
        existing.push(task::insert_task(pool, &draft).await?);
        outcome.created += 1;
    }
    Ok(outcome)
}

async fn project_transcript(pool: &PgPool, project_id: Uuid) -> Result<String, sqlx::Error> {
    let lines: Vec<String> = sqlx::query_scalar(
        r"SELECT ts.text
          FROM transcript_segments ts
          JOIN meetings m ON m.id = ts.meeting_id
          WHERE m.project_id = $1
          ORDER BY ts.timestamp",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(lines.join("\n"))
}

/// Ask the model for the board and apply it to the project's tasks.
pub async fn extract_tasks(llm: &dyn LlmChat, transcript: &str) -> Result<Vec<ExtractedTask>, ExtractError> {
    let body = truncate_chars(transcript, MAX_TRANSCRIPT_CHARS);
    let messages = [Message::user(format!("Transcript:\n{body}"))];
    let response = llm.chat(ChatRequest::json(EXTRACT_MAX_TOKENS, EXTRACT_SYSTEM_PROMPT, &messages)).await?;
    if response.truncated() {
        warn!(max_tokens = EXTRACT_MAX_TOKENS, "extract: reply hit the token limit");
    }
    parse_extraction(&response.text())
}

/// Extract tasks from every meeting of a project. Members only.
pub async fn extract_project_tasks(
    state: &AppState,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<ExtractOutcome, ExtractError> {
    project::require_member(&state.pool, project_id, user_id).await?;
    let llm = state.llm.clone().ok_or(ExtractError::NotConfigured)?;

    let transcript = project_transcript(&state.pool, project_id).await?;
    if transcript.trim().chars().count() < MIN_TRANSCRIPT_CHARS {
        return Ok(ExtractOutcome::default());
    }

    let items = extract_tasks(llm.as_ref(), &transcript).await?;
    let members = project::member_details(&state.pool, project_id).await?;
    let outcome = apply_extraction(&state.pool, project_id, &items, &members).await?;
    info!(%project_id, created = outcome.created, updated = outcome.updated, "tasks extracted");
    Ok(outcome)
}

#[cfg(test)]
#[path = "task_extract_test.rs"]
mod tests;
