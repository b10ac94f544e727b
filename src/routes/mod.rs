//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every REST and websocket endpoint lives under `/api/v1`. The root and
//! `/health` stay outside it for load balancers. CORS admits the configured
//! origins plus any local dev server, with credentials.

pub mod assignments;
pub mod attendance;
pub mod auth;
pub mod error;
pub mod meetings;
pub mod projects;
pub mod recordings;
pub mod tasks;
pub mod transcripts;
pub mod ws;

use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::response::Json;
use axum::routing::{delete, get, patch, post, put};
use serde_json::{Value, json};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

const CORS_MAX_AGE: Duration = Duration::from_secs(86_400);
/// Multipart framing overhead allowed on top of the file itself.
const UPLOAD_SLACK_BYTES: usize = 1024 * 1024;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    let upload_limit = state.config.max_upload_bytes.saturating_mul(2).saturating_add(UPLOAD_SLACK_BYTES);

    let api = Router::new()
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login_form))
        .route("/auth/login/json", post(auth::login_json))
        .route("/auth/me", get(auth::me))
        .route("/auth/change-password", post(auth::change_password))
        .route("/auth/logout", post(auth::logout))
        // Projects
        .route("/projects", get(projects::list_projects).post(projects::create_project))
        .route("/projects/all", delete(projects::delete_all_projects))
        .route("/projects/join/{invite_code}", post(projects::join_project))
        .route("/projects/{id}", get(projects::get_project).delete(projects::delete_project))
        .route("/projects/{id}/leave", post(projects::leave_project))
        .route("/projects/{id}/tasks", post(projects::create_project_task))
        .route("/projects/{id}/tasks/{task_id}", put(projects::update_project_task))
        .route("/projects/{id}/extract-tasks", post(projects::extract_tasks))
        .route(
            "/projects/{id}/assignments",
            get(projects::list_assignments).post(projects::create_assignment),
        )
        // Tasks
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/tasks/{id}",
            get(tasks::get_task).patch(tasks::update_task).delete(tasks::delete_task),
        )
        // Meetings
        .route("/meetings", get(meetings::list_meetings).post(meetings::create_meeting))
        .route("/meetings/start-instant", post(meetings::start_instant))
        .route("/meetings/schedule", post(meetings::schedule_meeting))
        .route("/meetings/{id}", get(meetings::get_meeting))
        .route("/meetings/{id}/start", post(meetings::start_meeting))
        .route("/meetings/{id}/stop", post(meetings::stop_meeting))
        .route("/meetings/{id}/generate-summary", post(meetings::generate_summary))
        .route("/meetings/{id}/participants/join", post(meetings::participant_join))
        .route("/meetings/{id}/participants/leave", post(meetings::participant_leave))
        // Attendance
        .route("/attendance", post(attendance::record_attendance))
        .route("/attendance/{id}", patch(attendance::update_attendance))
        .route("/attendance/meeting/{id}", get(attendance::list_for_meeting))
        .route("/attendance/meeting/{id}/join", post(attendance::join_meeting))
        .route("/attendance/meeting/{id}/leave", post(attendance::leave_meeting))
        // Transcripts
        .route("/transcripts", post(transcripts::create_transcript))
        .route("/transcripts/{id}", delete(transcripts::delete_transcript))
        .route("/transcripts/meeting/{id}", get(transcripts::list_for_meeting))
        .route("/transcripts/meeting/{id}/full", get(transcripts::full_transcript))
        // Recordings
        .route("/recordings", get(recordings::list_recordings))
        .route(
            "/recordings/upload",
            post(recordings::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/recordings/{id}", get(recordings::get_recording))
        // Assignments
        .route(
            "/assignments/{id}/submissions",
            get(assignments::list_submissions).post(assignments::submit),
        )
        // WebSockets
        .route("/ws/meeting/{id}", get(ws::meeting_socket))
        .route("/ws/meeting/{id}/live", get(ws::live_socket))
        .route("/ws/audio/{id}", get(ws::audio_socket))
        .route("/ws/jitsi-live", get(ws::jitsi_live_socket));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            allowed.contains(origin) || origin.to_str().is_ok_and(is_local_origin)
        }))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .max_age(CORS_MAX_AGE)
}

/// `http://localhost:<port>` or `http://127.0.0.1:<port>`, any port.
fn is_local_origin(origin: &str) -> bool {
    let Some(rest) = origin.strip_prefix("http://") else {
        return false;
    };
    let host = rest.split_once(':').map_or(rest, |(host, port)| {
        if port.chars().all(|c| c.is_ascii_digit()) { host } else { "" }
    });
    host == "localhost" || host == "127.0.0.1"
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Meeting Monitor API", "version": env!("CARGO_PKG_VERSION") }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
