use super::*;
use crate::state::test_helpers;
use axum::http::Request;
use time::OffsetDateTime;
use uuid::Uuid;

fn auth_user(role: Role) -> AuthUser {
    let now = OffsetDateTime::now_utc();
    AuthUser {
        user: User {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            role,
            avatar: None,
            created_at: now,
            updated_at: now,
        },
        token: "tok".into(),
    }
}

fn parts_with(header: Option<&str>) -> Parts {
    let mut req = Request::builder().uri("/api/v1/auth/me");
    if let Some(value) = header {
        req = req.header(axum::http::header::AUTHORIZATION, value);
    }
    req.body(()).unwrap().into_parts().0
}

#[test]
fn require_role_accepts_listed_roles() {
    assert!(require_role(&auth_user(Role::Manager), &[Role::Manager]).is_ok());
    assert!(require_role(&auth_user(Role::Teacher), &[Role::Manager, Role::Teacher]).is_ok());
}

#[test]
fn require_role_names_allowed_roles() {
    let err = require_role(&auth_user(Role::Student), &[Role::Manager, Role::Teacher]).unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);
    assert_eq!(err.detail, "Access denied. Required roles: manager, teacher");
}

#[tokio::test]
async fn bot_key_is_open_without_a_secret() {
    let state = test_helpers::test_app_state();
    assert!(require_bot_key(&state, None).is_ok());
    assert!(require_bot_key(&state, Some("anything")).is_ok());
}

#[tokio::test]
async fn bot_key_must_match_configured_secret() {
    let mut config = test_helpers::test_config();
    config.bot.shared_secret = Some("s3cret".into());
    let state = test_helpers::test_app_state_with_config(config);

    assert!(require_bot_key(&state, Some("s3cret")).is_ok());
    let err = require_bot_key(&state, Some("wrong")).unwrap_err();
    assert_eq!(err, ApiError::forbidden("Invalid bot key"));
    assert!(require_bot_key(&state, None).is_err());
}

#[tokio::test]
async fn blank_token_is_unauthorized_without_a_lookup() {
    let state = test_helpers::test_app_state();
    let err = authenticate_token(&state, "   ").await.unwrap_err();
    assert_eq!(err, ApiError::unauthorized(INVALID_CREDENTIALS_DETAIL));
}

#[tokio::test]
async fn extractor_rejects_missing_header() {
    let state = test_helpers::test_app_state();
    let mut parts = parts_with(None);
    let err = AuthUser::from_request_parts(&mut parts, &state).await.unwrap_err();
    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    assert_eq!(err.detail, INVALID_CREDENTIALS_DETAIL);
}

#[tokio::test]
async fn extractor_rejects_non_bearer_scheme() {
    let state = test_helpers::test_app_state();
    let mut parts = parts_with(Some("Basic YWRhOnNlY3JldA=="));
    let err = AuthUser::from_request_parts(&mut parts, &state).await.unwrap_err();
    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
}

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use crate::db::test_support::{create_user, integration_pool};

    #[tokio::test]
    async fn login_then_me_then_logout() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "Grace", Role::Member).await;
        let mut state = test_helpers::test_app_state();
        state.pool = pool;

        let Json(token) = login_json(
            State(state.clone()),
            Json(LoginJson { email: user.email.clone(), password: "secret123".into() }),
        )
        .await
        .unwrap();
        assert_eq!(token.token_type, "bearer");

        let mut parts = parts_with(Some(&format!("Bearer {}", token.access_token)));
        let auth = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(auth.user.id, user.id);

        logout(State(state.clone()), auth).await.unwrap();
        let err = authenticate_token(&state, &token.access_token).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn form_login_uses_username_as_email() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "Linus", Role::Student).await;
        let mut state = test_helpers::test_app_state();
        state.pool = pool;

        let result = login_form(
            State(state.clone()),
            Form(LoginForm { username: user.email.to_uppercase(), password: "secret123".into() }),
        )
        .await;
        assert!(result.is_ok());

        let err = login_form(
            State(state),
            Form(LoginForm { username: user.email, password: "wrong-password".into() }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn change_password_revokes_other_sessions() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "Barbara", Role::Teacher).await;
        let mut state = test_helpers::test_app_state();
        state.pool = pool.clone();

        let ttl = state.config.access_token_ttl;
        let current = session::create_session(&pool, user.id, ttl).await.unwrap();
        let other = session::create_session(&pool, user.id, ttl).await.unwrap();
        let auth = authenticate_token(&state, &current).await.unwrap();

        change_password(
            State(state.clone()),
            auth,
            Json(ChangePasswordBody { current_password: "secret123".into(), new_password: "fresh-pass-9".into() }),
        )
        .await
        .unwrap();

        assert!(authenticate_token(&state, &current).await.is_ok());
        assert!(authenticate_token(&state, &other).await.is_err());
    }
}
