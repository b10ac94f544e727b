//! Project service: workspaces and classes, membership, invite codes.
//!
//! DESIGN
//! ======
//! A project is either a business workspace or an education class; the two
//! share one table and differ only by `project_type`. Membership lives in
//! `project_members`, ordered by `joined_at`, which decides who inherits
//! ownership when the owner leaves.
//!
//! Every other service gates access through `require_member` /
//! `require_owner` so the rules live in one place.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::is_unique_violation;

const INVITE_CODE_LEN: usize = 6;
const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const INVITE_CODE_ATTEMPTS: usize = 5;
const LIST_LIMIT: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Project not found")]
    NotFound,
    #[error("Access denied to project")]
    Forbidden,
    #[error("Only project owner can perform this action")]
    NotOwner,
    #[error("Invalid invite code")]
    InvalidInviteCode,
    #[error("Already a member")]
    AlreadyMember,
    #[error("Not a member of this project")]
    NotMember,
    #[error("Invite code already exists")]
    InviteCodeTaken,
    #[error("{0}")]
    Invalid(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    #[default]
    Workspace,
    Class,
}

impl ProjectType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Class => "class",
        }
    }
}

impl TryFrom<String> for ProjectType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "workspace" => Ok(Self::Workspace),
            "class" => Ok(Self::Class),
            _ => Err(format!("unknown project type: {value}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MemberDetail {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub invite_code: String,
    #[sqlx(try_from = "String")]
    pub project_type: ProjectType,
    pub owner_id: Uuid,
    /// Member user ids in join order.
    pub members: Vec<Uuid>,
    #[sqlx(skip)]
    pub member_details: Vec<MemberDetail>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Project {
    #[must_use]
    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub invite_code: Option<String>,
    #[serde(default)]
    pub project_type: ProjectType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    OwnershipTransferred { new_owner: Uuid },
    Deleted,
}

const PROJECT_SELECT: &str = r"
    SELECT p.id, p.name, p.description, p.invite_code, p.project_type, p.owner_id,
           p.created_at, p.updated_at,
           COALESCE(
               array_agg(pm.user_id ORDER BY pm.joined_at) FILTER (WHERE pm.user_id IS NOT NULL),
               '{}'
           ) AS members
    FROM projects p
    LEFT JOIN project_members pm ON pm.project_id = p.id";

// =============================================================================
// INVITE CODES
// =============================================================================

#[must_use]
pub fn generate_invite_code() -> String {
    let mut rng = rand::rng();
    (0..INVITE_CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..INVITE_CODE_ALPHABET.len());
            char::from(INVITE_CODE_ALPHABET[idx])
        })
        .collect()
}

fn clean_invite_code(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_owned)
}

// =============================================================================
// ACCESS
// =============================================================================

pub async fn get_project(pool: &PgPool, project_id: Uuid) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(&format!("{PROJECT_SELECT} WHERE p.id = $1 GROUP BY p.id"))
        .bind(project_id)
        .fetch_optional(pool)
        .await
}

/// Load a project the user belongs to.
pub async fn require_member(pool: &PgPool, project_id: Uuid, user_id: Uuid) -> Result<Project, ProjectError> {
    let project = get_project(pool, project_id)
        .await?
        .ok_or(ProjectError::NotFound)?;
    if !project.is_member(user_id) {
        return Err(ProjectError::Forbidden);
    }
    Ok(project)
}

/// Load a project the user owns.
pub async fn require_owner(pool: &PgPool, project_id: Uuid, user_id: Uuid) -> Result<Project, ProjectError> {
    let project = get_project(pool, project_id)
        .await?
        .ok_or(ProjectError::NotFound)?;
    if project.owner_id != user_id {
        return Err(ProjectError::NotOwner);
    }
    Ok(project)
}

/// Ids of every project the user belongs to.
pub async fn member_project_ids(pool: &PgPool, user_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar("SELECT project_id FROM project_members WHERE user_id = $1")
        .bind(user_id)
        .fetch_all(pool)
        .await
}

pub async fn member_details(pool: &PgPool, project_id: Uuid) -> Result<Vec<MemberDetail>, sqlx::Error> {
    sqlx::query_as::<_, MemberDetail>(
        r"SELECT u.id, u.name, u.email
          FROM project_members pm
          JOIN users u ON u.id = pm.user_id
          WHERE pm.project_id = $1
          ORDER BY pm.joined_at",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Create a project owned by `owner_id`, who also becomes its first member.
pub async fn create_project(pool: &PgPool, owner_id: Uuid, input: NewProject) -> Result<Project, ProjectError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ProjectError::Invalid("Project name is required"));
    }
    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    let explicit_code = clean_invite_code(input.invite_code.as_deref());
    if let Some(code) = &explicit_code {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM projects WHERE invite_code = $1)")
            .bind(code)
            .fetch_one(pool)
            .await?;
        if taken {
            return Err(ProjectError::InviteCodeTaken);
        }
    }

    let attempts = if explicit_code.is_some() { 1 } else { INVITE_CODE_ATTEMPTS };
    for _ in 0..attempts {
        let code = explicit_code.clone().unwrap_or_else(generate_invite_code);
        let project_id = Uuid::new_v4();

        let mut tx = pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO projects (id, name, description, invite_code, project_type, owner_id)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(project_id)
        .bind(name)
        .bind(description)
        .bind(&code)
        .bind(input.project_type.as_str())
        .bind(owner_id)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        add_member(&mut tx, project_id, owner_id).await?;
        tx.commit().await?;

        return get_project(pool, project_id)
            .await?
            .ok_or(ProjectError::NotFound);
    }
    Err(ProjectError::InviteCodeTaken)
}

/// Projects the user belongs to, newest first.
pub async fn list_projects(
    pool: &PgPool,
    user_id: Uuid,
    project_type: Option<ProjectType>,
) -> Result<Vec<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(&format!(
        "{PROJECT_SELECT}
         WHERE p.id IN (SELECT project_id FROM project_members WHERE user_id = $1)
           AND ($2::text IS NULL OR p.project_type = $2)
         GROUP BY p.id
         ORDER BY p.created_at DESC
         LIMIT $3"
    ))
    .bind(user_id)
    .bind(project_type.map(ProjectType::as_str))
    .bind(LIST_LIMIT)
    .fetch_all(pool)
    .await
}

/// Load a project for a member, with member details filled in.
pub async fn get_project_for_member(pool: &PgPool, project_id: Uuid, user_id: Uuid) -> Result<Project, ProjectError> {
    let mut project = require_member(pool, project_id, user_id).await?;
    project.member_details = member_details(pool, project_id).await?;
    Ok(project)
}

/// Join the project that owns `invite_code`.
pub async fn join_by_invite_code(pool: &PgPool, invite_code: &str, user_id: Uuid) -> Result<Project, ProjectError> {
    let code = invite_code.trim();
    if code.is_empty() {
        return Err(ProjectError::InvalidInviteCode);
    }
    let project_id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM projects WHERE invite_code = $1")
        .bind(code)
        .fetch_optional(pool)
        .await?;
    let project_id = project_id.ok_or(ProjectError::InvalidInviteCode)?;

    let inserted = sqlx::query(
        "INSERT INTO project_members (project_id, user_id) VALUES ($1, $2)
         ON CONFLICT (project_id, user_id) DO NOTHING",
    )
    .bind(project_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    if inserted.rows_affected() == 0 {
        return Err(ProjectError::AlreadyMember);
    }
    touch(pool, project_id).await?;

    get_project(pool, project_id)
        .await?
        .ok_or(ProjectError::NotFound)
}

/// Leave a project. The earliest-joined remaining member inherits ownership;
/// the project is deleted when nobody is left.
pub async fn leave_project(pool: &PgPool, project_id: Uuid, user_id: Uuid) -> Result<LeaveOutcome, ProjectError> {
    let mut tx = pool.begin().await?;

    let owner_id: Option<Uuid> = sqlx::query_scalar("SELECT owner_id FROM projects WHERE id = $1 FOR UPDATE")
        .bind(project_id)
        .fetch_optional(&mut *tx)
        .await?;
    let owner_id = owner_id.ok_or(ProjectError::NotFound)?;

    let removed = sqlx::query("DELETE FROM project_members WHERE project_id = $1 AND user_id = $2")
        .bind(project_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    if removed.rows_affected() == 0 {
        return Err(ProjectError::NotMember);
    }

    let next_member: Option<Uuid> = sqlx::query_scalar(
        "SELECT user_id FROM project_members WHERE project_id = $1 ORDER BY joined_at LIMIT 1",
    )
    .bind(project_id)
    .fetch_optional(&mut *tx)
    .await?;

    let outcome = match next_member {
        None => {
            sqlx::query("DELETE FROM projects WHERE id = $1")
                .bind(project_id)
                .execute(&mut *tx)
                .await?;
            LeaveOutcome::Deleted
        }
        Some(new_owner) if owner_id == user_id => {
            sqlx::query("UPDATE projects SET owner_id = $2, updated_at = now() WHERE id = $1")
                .bind(project_id)
                .bind(new_owner)
                .execute(&mut *tx)
                .await?;
            LeaveOutcome::OwnershipTransferred { new_owner }
        }
        Some(_) => {
            sqlx::query("UPDATE projects SET updated_at = now() WHERE id = $1")
                .bind(project_id)
                .execute(&mut *tx)
                .await?;
            LeaveOutcome::Left
        }
    };

    tx.commit().await?;
    Ok(outcome)
}

/// Delete a project. Owner only.
pub async fn delete_project(pool: &PgPool, project_id: Uuid, user_id: Uuid) -> Result<(), ProjectError> {
    require_owner(pool, project_id, user_id).await?;
    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(project_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete every project the user owns. Returns how many were removed.
pub async fn delete_owned_projects(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM projects WHERE owner_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// =============================================================================
// HELPERS
// =============================================================================

async fn add_member(tx: &mut Transaction<'_, Postgres>, project_id: Uuid, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO project_members (project_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
        .bind(project_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn touch(pool: &PgPool, project_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE projects SET updated_at = now() WHERE id = $1")
        .bind(project_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "project_test.rs"]
mod tests;
