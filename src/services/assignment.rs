//! Assignments and submissions for class projects.
//!
//! The class owner posts assignments; every other member submits one answer
//! per assignment, replaced on resubmission.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::project::{self, Project, ProjectError, ProjectType};

#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("Assignment not found")]
    NotFound,
    #[error("Assignments require a class")]
    NotAClass,
    #[error("Title is required")]
    MissingTitle,
    #[error("Submission content is required")]
    EmptyContent,
    #[error("The class owner cannot submit")]
    OwnerCannotSubmit,
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Assignment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub lecture_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub created_by: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAssignment {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub lecture_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Submission {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
}

const ASSIGNMENT_COLUMNS: &str = "id, project_id, lecture_id, title, description, due_date, created_by, created_at";

fn require_class(project: &Project) -> Result<(), AssignmentError> {
    if project.project_type == ProjectType::Class {
        Ok(())
    } else {
        Err(AssignmentError::NotAClass)
    }
}

async fn find_assignment(pool: &PgPool, assignment_id: Uuid) -> Result<Assignment, AssignmentError> {
    sqlx::query_as::<_, Assignment>(&format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = $1"))
        .bind(assignment_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AssignmentError::NotFound)
}

pub async fn create_assignment(
    pool: &PgPool,
    user_id: Uuid,
    project_id: Uuid,
    input: NewAssignment,
) -> Result<Assignment, AssignmentError> {
    let project = project::get_project(pool, project_id)
        .await?
        .ok_or(ProjectError::NotFound)?;
    require_class(&project)?;
    if project.owner_id != user_id {
        return Err(ProjectError::NotOwner.into());
    }
    let title = input.title.trim();
    if title.is_empty() {
        return Err(AssignmentError::MissingTitle);
    }

    let assignment = sqlx::query_as::<_, Assignment>(&format!(
        "INSERT INTO assignments (id, project_id, lecture_id, title, description, due_date, created_by)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {ASSIGNMENT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(project_id)
    .bind(input.lecture_id)
    .bind(title)
    .bind(input.description.as_deref().map(str::trim).unwrap_or_default())
    .bind(input.due_date)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(assignment)
}

/// Soonest due first; undated assignments last.
pub async fn list_assignments(pool: &PgPool, user_id: Uuid, project_id: Uuid) -> Result<Vec<Assignment>, AssignmentError> {
    let project = project::require_member(pool, project_id, user_id).await?;
    require_class(&project)?;
    let assignments = sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments
         WHERE project_id = $1
         ORDER BY due_date ASC NULLS LAST, created_at ASC"
    ))
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(assignments)
}

/// Submit or replace the caller's answer.
pub async fn submit(pool: &PgPool, user_id: Uuid, assignment_id: Uuid, content: &str) -> Result<Submission, AssignmentError> {
    let assignment = find_assignment(pool, assignment_id).await?;
    let project = project::require_member(pool, assignment.project_id, user_id).await?;
    if project.owner_id == user_id {
        return Err(AssignmentError::OwnerCannotSubmit);
    }
    let content = content.trim();
    if content.is_empty() {
        return Err(AssignmentError::EmptyContent);
    }

    let submission = sqlx::query_as::<_, Submission>(
        r"WITH upserted AS (
              INSERT INTO submissions (id, assignment_id, student_id, content)
              VALUES ($1, $2, $3, $4)
              ON CONFLICT (assignment_id, student_id)
              DO UPDATE SET content = EXCLUDED.content, submitted_at = now()
              RETURNING id, assignment_id, student_id, content, submitted_at
          )
          SELECT s.id, s.assignment_id, s.student_id, u.name AS student_name, s.content, s.submitted_at
          FROM upserted s
          JOIN users u ON u.id = s.student_id",
    )
    .bind(Uuid::new_v4())
    .bind(assignment_id)
    .bind(user_id)
    .bind(content)
    .fetch_one(pool)
    .await?;
    Ok(submission)
}

/// The owner sees every submission; anyone else only their own.
pub async fn list_submissions(pool: &PgPool, user_id: Uuid, assignment_id: Uuid) -> Result<Vec<Submission>, AssignmentError> {
    let assignment = find_assignment(pool, assignment_id).await?;
    let project = project::require_member(pool, assignment.project_id, user_id).await?;
    let only_student = (project.owner_id != user_id).then_some(user_id);

    let submissions = sqlx::query_as::<_, Submission>(
        r"SELECT s.id, s.assignment_id, s.student_id, u.name AS student_name, s.content, s.submitted_at
          FROM submissions s
          JOIN users u ON u.id = s.student_id
          WHERE s.assignment_id = $1 AND ($2::uuid IS NULL OR s.student_id = $2)
          ORDER BY s.submitted_at DESC",
    )
    .bind(assignment_id)
    .bind(only_student)
    .fetch_all(pool)
    .await?;
    Ok(submissions)
}

#[cfg(test)]
#[path = "assignment_test.rs"]
mod tests;
