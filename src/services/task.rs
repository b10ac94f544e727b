//! Task service: project task board CRUD.
//!
//! DESIGN
//! ======
//! Tasks live on a five-column board. Older clients send hyphenated or
//! short status names, so every status input goes through
//! `TaskStatus::normalize` before it reaches the database.
//!
//! Access is always checked against the task's project membership.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::project::{self, ProjectError};

const LIST_LIMIT: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task not found")]
    NotFound,
    #[error("Invalid task status")]
    InvalidStatus,
    #[error("Invalid task priority")]
    InvalidPriority,
    #[error("Invalid due date")]
    InvalidDueDate,
    #[error("Task title is required")]
    MissingTitle,
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// STATUS / PRIORITY
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    InReview,
    Done,
    Blockers,
}

impl TaskStatus {
    pub const ALL: [Self; 5] = [Self::Todo, Self::InProgress, Self::InReview, Self::Done, Self::Blockers];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::Done => "done",
            Self::Blockers => "blockers",
        }
    }

    /// Map a board column name, including legacy spellings.
    #[must_use]
    pub fn normalize(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "todo" => Some(Self::Todo),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "in_review" | "review" => Some(Self::InReview),
            "done" => Some(Self::Done),
            "blockers" | "blocked" => Some(Self::Blockers),
            _ => None,
        }
    }
}

impl TryFrom<String> for TaskStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::normalize(&value).ok_or_else(|| format!("unknown task status: {value}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

impl TryFrom<String> for TaskPriority {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown task priority: {value}"))
    }
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
#[must_use]
pub fn parse_deadline(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }
    let format = time::macros::format_description!("[year]-[month]-[day]");
    Date::parse(raw, &format).ok().map(|d| d.midnight().assume_utc())
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: TaskStatus,
    #[sqlx(try_from = "String")]
    pub priority: TaskPriority,
    pub assignee_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub subtasks: Value,
    pub source_meeting_id: Option<Uuid>,
    pub is_auto_generated: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

/// Task creation body. `project_id` may come from the path instead.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub project_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub subtasks: Option<Value>,
    #[serde(default)]
    pub source_meeting_id: Option<Uuid>,
}

/// Partial update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub subtasks: Option<Value>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<String>,
}

/// A fully validated row ready to insert.
#[derive(Debug, Clone)]
pub(crate) struct TaskDraft {
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<OffsetDateTime>,
    pub subtasks: Value,
    pub source_meeting_id: Option<Uuid>,
    pub is_auto_generated: bool,
}

const TASK_COLUMNS: &str = "id, project_id, title, description, status, priority, assignee_id, due_date, \
     subtasks, source_meeting_id, is_auto_generated, created_at, updated_at, completed_at";

// =============================================================================
// VALIDATION
// =============================================================================

fn parse_status(raw: Option<&str>) -> Result<Option<TaskStatus>, TaskError> {
    match raw {
        None => Ok(None),
        Some(s) => TaskStatus::normalize(s).map(Some).ok_or(TaskError::InvalidStatus),
    }
}

fn parse_priority(raw: Option<&str>) -> Result<Option<TaskPriority>, TaskError> {
    match raw {
        None => Ok(None),
        Some(s) => TaskPriority::parse(s).map(Some).ok_or(TaskError::InvalidPriority),
    }
}

fn parse_due_date(raw: Option<&str>) -> Result<Option<OffsetDateTime>, TaskError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_deadline(s).map(Some).ok_or(TaskError::InvalidDueDate),
    }
}

fn clean_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

impl NewTask {
    fn into_draft(self, project_id: Uuid) -> Result<TaskDraft, TaskError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(TaskError::MissingTitle);
        }
        Ok(TaskDraft {
            project_id,
            title: title.to_owned(),
            description: clean_text(self.description.as_deref()),
            status: parse_status(self.status.as_deref())?.unwrap_or_default(),
            priority: parse_priority(self.priority.as_deref())?.unwrap_or_default(),
            assignee_id: self.assignee_id,
            due_date: parse_due_date(self.due_date.as_deref())?,
            subtasks: self.subtasks.unwrap_or_else(|| Value::Array(Vec::new())),
            source_meeting_id: self.source_meeting_id,
            is_auto_generated: false,
        })
    }
}

/// Apply a partial update in memory.
pub(crate) fn apply_update(task: &mut Task, update: TaskUpdate, now: OffsetDateTime) -> Result<(), TaskError> {
    if let Some(title) = update.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(TaskError::MissingTitle);
        }
        title.clone_into(&mut task.title);
    }
    if let Some(description) = update.description {
        task.description = clean_text(Some(&description));
    }
    if let Some(priority) = parse_priority(update.priority.as_deref())? {
        task.priority = priority;
    }
    if let Some(assignee_id) = update.assignee_id {
        task.assignee_id = Some(assignee_id);
    }
    if update.due_date.is_some() {
        task.due_date = parse_due_date(update.due_date.as_deref())?;
    }
    if let Some(subtasks) = update.subtasks {
        task.subtasks = subtasks;
    }
    if let Some(status) = parse_status(update.status.as_deref())? {
        task.status = status;
        if status == TaskStatus::Done && update.completed_at.is_none() {
            task.completed_at = Some(now);
        }
    }
    if let Some(completed_at) = update.completed_at {
        task.completed_at = Some(completed_at);
    }
    task.updated_at = now;
    Ok(())
}

// =============================================================================
// STORAGE
// =============================================================================

pub(crate) async fn insert_task(pool: &PgPool, draft: &TaskDraft) -> Result<Task, sqlx::Error> {
    let completed_at = (draft.status == TaskStatus::Done).then(OffsetDateTime::now_utc);
    sqlx::query_as::<_, Task>(&format!(
        "INSERT INTO tasks (id, project_id, title, description, status, priority, assignee_id, due_date,
                            subtasks, source_meeting_id, is_auto_generated, completed_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         RETURNING {TASK_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(draft.project_id)
    .bind(&draft.title)
    .bind(&draft.description)
    .bind(draft.status.as_str())
    .bind(draft.priority.as_str())
    .bind(draft.assignee_id)
    .bind(draft.due_date)
    .bind(&draft.subtasks)
    .bind(draft.source_meeting_id)
    .bind(draft.is_auto_generated)
    .bind(completed_at)
    .fetch_one(pool)
    .await
}

/// Write every mutable column of `task`.
pub(crate) async fn save_task(pool: &PgPool, task: &Task) -> Result<Task, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        "UPDATE tasks
         SET title = $2, description = $3, status = $4, priority = $5, assignee_id = $6,
             due_date = $7, subtasks = $8, completed_at = $9, updated_at = $10
         WHERE id = $1
         RETURNING {TASK_COLUMNS}"
    ))
    .bind(task.id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.status.as_str())
    .bind(task.priority.as_str())
    .bind(task.assignee_id)
    .bind(task.due_date)
    .bind(&task.subtasks)
    .bind(task.completed_at)
    .bind(task.updated_at)
    .fetch_one(pool)
    .await
}

pub async fn find_task(pool: &PgPool, task_id: Uuid) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
        .bind(task_id)
        .fetch_optional(pool)
        .await
}

/// All tasks of a project, newest first.
pub async fn list_for_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = $1 ORDER BY created_at DESC"
    ))
    .bind(project_id)
    .fetch_all(pool)
    .await
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Create a task. `project_id` from the path wins over the body.
pub async fn create_task(
    pool: &PgPool,
    user_id: Uuid,
    path_project_id: Option<Uuid>,
    input: NewTask,
) -> Result<Task, TaskError> {
    let project_id = path_project_id
        .or(input.project_id)
        .ok_or(ProjectError::Invalid("project_id is required"))?;
    let draft = input.into_draft(project_id)?;
    project::require_member(pool, project_id, user_id).await?;
    Ok(insert_task(pool, &draft).await?)
}

pub async fn list_tasks(pool: &PgPool, user_id: Uuid, filter: TaskFilter) -> Result<Vec<Task>, TaskError> {
    let status = parse_status(filter.status.as_deref())?;
    let project_ids = match filter.project_id {
        Some(project_id) => {
            project::require_member(pool, project_id, user_id).await?;
            vec![project_id]
        }
        None => project::member_project_ids(pool, user_id).await?,
    };
    if project_ids.is_empty() {
        return Ok(Vec::new());
    }

    let tasks = sqlx::query_as::<_, Task>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks
         WHERE project_id = ANY($1)
           AND ($2::uuid IS NULL OR assignee_id = $2)
           AND ($3::text IS NULL OR status = $3)
         ORDER BY created_at DESC
         LIMIT $4"
    ))
    .bind(&project_ids)
    .bind(filter.assignee_id)
    .bind(status.map(TaskStatus::as_str))
    .bind(LIST_LIMIT)
    .fetch_all(pool)
    .await?;
    Ok(tasks)
}

/// Load a task the user can see.
pub async fn get_task(pool: &PgPool, user_id: Uuid, task_id: Uuid) -> Result<Task, TaskError> {
    let task = find_task(pool, task_id).await?.ok_or(TaskError::NotFound)?;
    project::require_member(pool, task.project_id, user_id).await?;
    Ok(task)
}

/// Apply a partial update. With `path_project_id`, the task must belong to that project.
pub async fn update_task(
    pool: &PgPool,
    user_id: Uuid,
    task_id: Uuid,
    path_project_id: Option<Uuid>,
    update: TaskUpdate,
) -> Result<Task, TaskError> {
    let mut task = get_task(pool, user_id, task_id).await?;
    if path_project_id.is_some_and(|id| id != task.project_id) {
        return Err(TaskError::NotFound);
    }
    apply_update(&mut task, update, OffsetDateTime::now_utc())?;
    Ok(save_task(pool, &task).await?)
}

pub async fn delete_task(pool: &PgPool, user_id: Uuid, task_id: Uuid) -> Result<(), TaskError> {
    let task = get_task(pool, user_id, task_id).await?;
    sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(task.id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "task_test.rs"]
mod tests;
