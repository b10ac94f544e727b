use super::*;
use crate::state::test_helpers;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use tower::ServiceExt;
use uuid::Uuid;

async fn send(state: AppState, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app(state).oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, headers, body)
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_healthy() {
    let (status, _, body) = send(test_helpers::test_app_state(), get_req("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy"}));
}

#[tokio::test]
async fn root_names_the_api() {
    let (status, _, body) = send(test_helpers::test_app_state(), get_req("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Meeting Monitor API");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn protected_routes_require_bearer_token() {
    for uri in ["/api/v1/auth/me", "/api/v1/projects", "/api/v1/meetings", "/api/v1/recordings"] {
        let (status, headers, body) = send(test_helpers::test_app_state(), get_req(uri)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(headers[header::WWW_AUTHENTICATE], "Bearer");
        assert_eq!(body, json!({"detail": "Could not validate credentials"}));
    }
}

#[tokio::test]
async fn bot_hooks_reject_wrong_key() {
    let mut config = test_helpers::test_config();
    config.bot.shared_secret = Some("s3cret".into());
    let state = test_helpers::test_app_state_with_config(config);

    let req = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/meetings/{}/participants/join?key=nope", Uuid::new_v4()))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"participant_id":"p1","display_name":"Bea"}"#))
        .unwrap();
    let (status, _, body) = send(state, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"detail": "Invalid bot key"}));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (status, _, _) = send(test_helpers::test_app_state(), get_req("/api/v1/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn preflight_allows_any_local_dev_port_with_credentials() {
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/projects")
        .header(header::ORIGIN, "http://localhost:4321")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization,content-type")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(test_helpers::test_app_state(), req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:4321");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
}

#[tokio::test]
async fn foreign_origin_gets_no_cors_grant() {
    let req = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "https://evil.example")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(test_helpers::test_app_state(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[test]
fn local_origin_matching() {
    assert!(is_local_origin("http://localhost:5173"));
    assert!(is_local_origin("http://127.0.0.1:9999"));
    assert!(is_local_origin("http://localhost"));
    assert!(!is_local_origin("https://localhost:5173"));
    assert!(!is_local_origin("http://localhost.evil.com:80"));
    assert!(!is_local_origin("http://localhost:80@evil.com"));
}
