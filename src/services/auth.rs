//! Account service: registration, password login, password changes.
//!
//! Passwords are stored as Argon2 PHC strings. Emails are normalized
//! (trimmed, lowercased) before every lookup so logins are case-insensitive.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Name is required")]
    InvalidName,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Incorrect email or password")]
    InvalidCredentials,
    #[error("Current password is incorrect")]
    WrongPassword,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Member,
    Teacher,
    Student,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Member => "member",
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "manager" => Some(Self::Manager),
            "member" => Some(Self::Member),
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            _ => None,
        }
    }
}

/// Public user record. Never carries the password hash.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub avatar: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown role: {value}"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub avatar: Option<String>,
}

const USER_COLUMNS: &str = "id, name, email, role, avatar, created_at, updated_at";

// =============================================================================
// HELPERS
// =============================================================================

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || normalized.contains(char::is_whitespace) {
        return None;
    }
    Some(normalized)
}

/// Hash a password into an Argon2 PHC string.
///
/// # Errors
///
/// Returns [`AuthError::Hash`] if the salt or hash cannot be produced.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt_bytes: [u8; 16] = rand::rng().random();
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hash(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Check a password against a stored PHC string. Malformed hashes never verify.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// [`hash_password`] on the blocking pool, off the async workers.
async fn hash_password_blocking(password: &str) -> Result<String, AuthError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Hash(e.to_string()))?
}

/// [`verify_password`] on the blocking pool. A panicked task never verifies.
async fn verify_password_blocking(password: &str, stored_hash: String) -> bool {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .unwrap_or(false)
}

fn check_password_len(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::PasswordTooShort);
    }
    Ok(())
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Create an account.
pub async fn register(pool: &PgPool, new_user: NewUser) -> Result<User, AuthError> {
    let email = normalize_email(&new_user.email).ok_or(AuthError::InvalidEmail)?;
    let name = new_user.name.trim();
    if name.is_empty() {
        return Err(AuthError::InvalidName);
    }
    check_password_len(&new_user.password)?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(pool)
        .await?;
    if exists {
        return Err(AuthError::EmailTaken);
    }

    let password_hash = hash_password_blocking(&new_user.password).await?;
    let avatar = new_user.avatar.filter(|a| !a.trim().is_empty());
    let result = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (id, name, email, password_hash, role, avatar)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {USER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(&email)
    .bind(password_hash)
    .bind(new_user.role.as_str())
    .bind(avatar)
    .fetch_one(pool)
    .await;

    match result {
        Ok(user) => Ok(user),
        // Lost a race with a concurrent registration of the same email.
        Err(e) if crate::db::is_unique_violation(&e) => Err(AuthError::EmailTaken),
        Err(e) => Err(e.into()),
    }
}

/// Verify email + password and return the user.
pub async fn authenticate(pool: &PgPool, email: &str, password: &str) -> Result<User, AuthError> {
    let Some(email) = normalize_email(email) else {
        return Err(AuthError::InvalidCredentials);
    };
    let row: Option<(Uuid, String)> = sqlx::query_as("SELECT id, password_hash FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(pool)
        .await?;
    let Some((user_id, stored_hash)) = row else {
        return Err(AuthError::InvalidCredentials);
    };
    if !verify_password_blocking(password, stored_hash).await {
        return Err(AuthError::InvalidCredentials);
    }
    get_user(pool, user_id)
        .await?
        .ok_or(AuthError::InvalidCredentials)
}

pub async fn get_user(pool: &PgPool, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Replace the user's password after checking the current one.
pub async fn change_password(
    pool: &PgPool,
    user_id: Uuid,
    current_password: &str,
    new_password: &str,
) -> Result<(), AuthError> {
    let stored_hash: Option<String> = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    let Some(stored_hash) = stored_hash else {
        return Err(AuthError::InvalidCredentials);
    };
    if !verify_password_blocking(current_password, stored_hash).await {
        return Err(AuthError::WrongPassword);
    }
    check_password_len(new_password)?;

    sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
        .bind(user_id)
        .bind(hash_password_blocking(new_password).await?)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
