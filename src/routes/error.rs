//! HTTP error mapping.
//!
//! Services return their own `thiserror` enums; handlers convert them into
//! `ApiError` with `?`. The body is always `{"detail": "..."}`, the shape the
//! dashboard reads. Database and provider internals are logged, never echoed.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use crate::rate_limit::RateLimitError;
use crate::services::assignment::AssignmentError;
use crate::services::attendance::AttendanceError;
use crate::services::auth::AuthError;
use crate::services::meeting::MeetingError;
use crate::services::project::ProjectError;
use crate::services::recording::RecordingError;
use crate::services::summary::SummaryError;
use crate::services::task::TaskError;
use crate::services::task_extract::ExtractError;
use crate::services::transcript::TranscriptError;

const INTERNAL_DETAIL: &str = "Internal server error";
const AI_NOT_CONFIGURED: &str = "AI features are not configured";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self { status, detail: detail.into() }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    /// Log the cause and answer a bare 500.
    pub fn internal(cause: &dyn std::fmt::Display) -> Self {
        error!(error = %cause, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_DETAIL)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(json!({ "detail": self.detail }))).into_response();
        if self.status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::internal(&e)
    }
}

impl From<RateLimitError> for ApiError {
    fn from(e: RateLimitError) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => Self::unauthorized(e.to_string()),
            AuthError::InvalidEmail
            | AuthError::InvalidName
            | AuthError::PasswordTooShort
            | AuthError::EmailTaken
            | AuthError::WrongPassword => Self::bad_request(e.to_string()),
            AuthError::Hash(_) | AuthError::Database(_) => Self::internal(&e),
        }
    }
}

impl From<ProjectError> for ApiError {
    fn from(e: ProjectError) -> Self {
        match e {
            ProjectError::NotFound | ProjectError::InvalidInviteCode => Self::not_found(e.to_string()),
            ProjectError::Forbidden | ProjectError::NotOwner => Self::forbidden(e.to_string()),
            ProjectError::AlreadyMember
            | ProjectError::NotMember
            | ProjectError::InviteCodeTaken
            | ProjectError::Invalid(_) => Self::bad_request(e.to_string()),
            ProjectError::Database(_) => Self::internal(&e),
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::NotFound => Self::not_found(e.to_string()),
            TaskError::InvalidStatus
            | TaskError::InvalidPriority
            | TaskError::InvalidDueDate
            | TaskError::MissingTitle => Self::bad_request(e.to_string()),
            TaskError::Project(inner) => inner.into(),
            TaskError::Database(_) => Self::internal(&e),
        }
    }
}

impl From<MeetingError> for ApiError {
    fn from(e: MeetingError) -> Self {
        match e {
            MeetingError::NotFound => Self::not_found(e.to_string()),
            MeetingError::Forbidden => Self::forbidden(e.to_string()),
            MeetingError::MissingMeetingUrl => Self::bad_request(e.to_string()),
            MeetingError::Project(inner) => inner.into(),
            MeetingError::RoomNameTaken | MeetingError::Database(_) => Self::internal(&e),
        }
    }
}

impl From<AttendanceError> for ApiError {
    fn from(e: AttendanceError) -> Self {
        match e {
            AttendanceError::NotFound => Self::not_found(e.to_string()),
            AttendanceError::Forbidden => Self::forbidden(e.to_string()),
            AttendanceError::Meeting(inner) => inner.into(),
            AttendanceError::Database(_) => Self::internal(&e),
        }
    }
}

impl From<TranscriptError> for ApiError {
    fn from(e: TranscriptError) -> Self {
        match e {
            TranscriptError::NotFound => Self::not_found(e.to_string()),
            TranscriptError::Forbidden => Self::forbidden(e.to_string()),
            TranscriptError::EmptyText => Self::bad_request(e.to_string()),
            TranscriptError::Meeting(inner) => inner.into(),
            TranscriptError::Database(_) => Self::internal(&e),
        }
    }
}

impl From<SummaryError> for ApiError {
    fn from(e: SummaryError) -> Self {
        match e {
            SummaryError::NotConfigured => Self::new(StatusCode::SERVICE_UNAVAILABLE, AI_NOT_CONFIGURED),
            SummaryError::Llm(_) | SummaryError::InvalidJson(_) => {
                error!(error = %e, "summary generation failed");
                Self::new(StatusCode::BAD_GATEWAY, "Summary generation failed")
            }
            SummaryError::Database(_) => Self::internal(&e),
        }
    }
}

impl From<ExtractError> for ApiError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::NotConfigured => Self::new(StatusCode::SERVICE_UNAVAILABLE, AI_NOT_CONFIGURED),
            ExtractError::Llm(_) | ExtractError::InvalidJson(_) => {
                error!(error = %e, "task extraction failed");
                Self::new(StatusCode::BAD_GATEWAY, "Task extraction failed")
            }
            ExtractError::Project(inner) => inner.into(),
            ExtractError::Database(_) => Self::internal(&e),
        }
    }
}

impl From<RecordingError> for ApiError {
    fn from(e: RecordingError) -> Self {
        match e {
            RecordingError::NotFound => Self::not_found(e.to_string()),
            RecordingError::Forbidden => Self::forbidden(e.to_string()),
            RecordingError::MissingFile => Self::bad_request(e.to_string()),
            RecordingError::TooLarge { .. } => Self::new(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
            RecordingError::NotConfigured => Self::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            RecordingError::Processing(_) => Self::new(StatusCode::BAD_GATEWAY, e.to_string()),
            RecordingError::Project(inner) => inner.into(),
            RecordingError::Database(_) => Self::internal(&e),
        }
    }
}

impl From<AssignmentError> for ApiError {
    fn from(e: AssignmentError) -> Self {
        match e {
            AssignmentError::NotFound => Self::not_found(e.to_string()),
            AssignmentError::OwnerCannotSubmit => Self::forbidden(e.to_string()),
            AssignmentError::NotAClass | AssignmentError::MissingTitle | AssignmentError::EmptyContent => {
                Self::bad_request(e.to_string())
            }
            AssignmentError::Project(inner) => inner.into(),
            AssignmentError::Database(_) => Self::internal(&e),
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
