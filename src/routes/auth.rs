//! Auth routes: registration, bearer login, password changes, logout.

use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Json};
use axum::Form;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::error::ApiError;
use crate::services::auth::{self as auth_svc, NewUser, Role, User};
use crate::services::session;
use crate::state::AppState;

pub const INVALID_CREDENTIALS_DETAIL: &str = "Could not validate credentials";

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated user extracted from `Authorization: Bearer <token>`.
/// Use as a handler parameter to require authentication.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::unauthorized(INVALID_CREDENTIALS_DETAIL))?;
        let app_state = AppState::from_ref(state);
        authenticate_token(&app_state, bearer.token()).await
    }
}

/// Resolve a raw session token to its user.
pub async fn authenticate_token(state: &AppState, token: &str) -> Result<AuthUser, ApiError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS_DETAIL));
    }
    let user = session::validate_session(&state.pool, token)
        .await?
        .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS_DETAIL))?;
    Ok(AuthUser { user, token: token.to_owned() })
}

/// Reject callers whose role is not in `allowed`.
pub fn require_role(auth: &AuthUser, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&auth.user.role) {
        return Ok(());
    }
    let names: Vec<&str> = allowed.iter().map(|r| r.as_str()).collect();
    Err(ApiError::forbidden(format!("Access denied. Required roles: {}", names.join(", "))))
}

/// Bot-facing endpoints carry `?key=` when `BOT_SHARED_SECRET` is set.
pub fn require_bot_key(state: &AppState, key: Option<&str>) -> Result<(), ApiError> {
    match state.config.bot.shared_secret.as_deref() {
        Some(secret) if key != Some(secret) => Err(ApiError::forbidden("Invalid bot key")),
        _ => Ok(()),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BotKeyQuery {
    #[serde(default)]
    pub key: Option<String>,
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginJson {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordBody {
    pub current_password: String,
    pub new_password: String,
}

async fn issue_token(state: &AppState, email: &str, password: &str) -> Result<Json<TokenResponse>, ApiError> {
    let user = auth_svc::authenticate(&state.pool, email, password).await?;
    let access_token = session::create_session(&state.pool, user.id, state.config.access_token_ttl).await?;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(TokenResponse { access_token, token_type: "bearer" }))
}

/// `POST /auth/register`
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = auth_svc::register(&state.pool, body).await?;
    info!(user_id = %user.id, role = user.role.as_str(), "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /auth/login`: OAuth2 password form (`username` is the email).
pub async fn login_form(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    issue_token(&state, &form.username, &form.password).await
}

/// `POST /auth/login/json`
pub async fn login_json(
    State(state): State<AppState>,
    Json(body): Json<LoginJson>,
) -> Result<Json<TokenResponse>, ApiError> {
    issue_token(&state, &body.email, &body.password).await
}

/// `GET /auth/me`
pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

/// `POST /auth/change-password`: also signs out every other session.
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<ChangePasswordBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth_svc::change_password(&state.pool, auth.user.id, &body.current_password, &body.new_password).await?;
    let revoked = session::delete_other_sessions(&state.pool, auth.user.id, &auth.token).await?;
    info!(user_id = %auth.user.id, revoked, "password changed");
    Ok(Json(json!({ "message": "Password changed successfully" })))
}

/// `POST /auth/logout`
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> Result<impl IntoResponse, ApiError> {
    session::delete_session(&state.pool, &auth.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
