//! Recording routes: multipart upload and listing.

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, header};
use axum::response::Json;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use super::auth::{AuthUser, authenticate_token};
use super::error::ApiError;
use crate::services::recording::{self, Recording, RecordingError, RecordingUpload};
use crate::state::AppState;

const DEFAULT_FILE_NAME: &str = "recording.mp3";

#[derive(Debug, Deserialize)]
pub struct RecordingListQuery {
    #[serde(default)]
    pub project_id: Option<Uuid>,
}

/// Form fields collected from the multipart body.
#[derive(Debug, Default)]
struct UploadForm {
    file_name: Option<String>,
    bytes: Option<Vec<u8>>,
    /// The file overran the size cap; its bytes were discarded.
    oversized: bool,
    project_id: Option<Uuid>,
    title: Option<String>,
    access_token: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn multipart_error(e: &MultipartError) -> ApiError {
    ApiError::new(e.status(), e.body_text())
}

/// Read the `file` field chunk by chunk. Returns `None` once the running
/// count passes `max_bytes`. With `drain` the rest of the field is consumed
/// without buffering; otherwise reading stops at the first chunk past the cap.
async fn read_file(field: &mut Field<'_>, max_bytes: usize, drain: bool) -> Result<Option<Vec<u8>>, MultipartError> {
    let mut bytes = Vec::new();
    let mut seen = 0usize;
    while let Some(chunk) = field.chunk().await? {
        seen = seen.saturating_add(chunk.len());
        if seen > max_bytes {
            if !drain {
                return Ok(None);
            }
            bytes = Vec::new();
            continue;
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok((seen <= max_bytes).then_some(bytes))
}

/// Parse the upload form. With `stop_when_oversized` the body is abandoned as
/// soon as the file overruns `max_bytes`; otherwise the remaining fields are
/// still read so a form `access_token` can identify the caller.
async fn read_form(multipart: &mut Multipart, max_bytes: usize, stop_when_oversized: bool) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    while let Some(mut field) = multipart.next_field().await.map_err(|e| multipart_error(&e))? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "file" => {
                form.file_name = Some(field.file_name().unwrap_or(DEFAULT_FILE_NAME).to_owned());
                form.bytes = read_file(&mut field, max_bytes, !stop_when_oversized)
                    .await
                    .map_err(|e| multipart_error(&e))?;
                form.oversized = form.bytes.is_none();
                if form.oversized && stop_when_oversized {
                    return Ok(form);
                }
            }
            "project_id" => {
                let raw = field.text().await.map_err(|e| multipart_error(&e))?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    form.project_id =
                        Some(Uuid::parse_str(raw).map_err(|_| ApiError::bad_request("Invalid project_id"))?);
                }
            }
            "title" => form.title = Some(field.text().await.map_err(|e| multipart_error(&e))?),
            "access_token" => form.access_token = Some(field.text().await.map_err(|e| multipart_error(&e))?),
            other => warn!(field = other, "ignoring unknown upload field"),
        }
    }
    Ok(form)
}

/// `POST /recordings/upload`: token from the bearer header, else the form.
///
/// A header token is checked before any of the body is read. A file larger
/// than `max_upload_bytes` is recorded as a `failed` recording and answered
/// with 413.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Recording>, ApiError> {
    let header_auth = match bearer_token(&headers) {
        Some(token) => Some(authenticate_token(&state, token).await?),
        None => None,
    };
    let form = read_form(&mut multipart, state.config.max_upload_bytes, header_auth.is_some()).await?;
    let auth = match header_auth {
        Some(auth) => auth,
        None => authenticate_token(&state, form.access_token.as_deref().unwrap_or_default()).await?,
    };

    let Some(file_name) = form.file_name else {
        return Err(RecordingError::MissingFile.into());
    };
    state.rate_limiter.check_and_record(auth.user.id)?;

    let mut upload = RecordingUpload {
        user_id: auth.user.id,
        project_id: form.project_id,
        title: form.title,
        file_name,
        bytes: Vec::new(),
    };
    if form.oversized {
        return Err(recording::reject_oversized(&state, &upload).await.into());
    }
    upload.bytes = form.bytes.unwrap_or_default();
    Ok(Json(recording::process_upload(&state, upload).await?))
}

/// `GET /recordings?project_id`
pub async fn list_recordings(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<RecordingListQuery>,
) -> Result<Json<Vec<Recording>>, ApiError> {
    Ok(Json(recording::list_recordings(&state.pool, auth.user.id, query.project_id).await?))
}

/// `GET /recordings/{id}`
pub async fn get_recording(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(recording_id): Path<Uuid>,
) -> Result<Json<Recording>, ApiError> {
    Ok(Json(recording::get_recording(&state.pool, auth.user.id, recording_id).await?))
}

#[cfg(test)]
#[path = "recordings_test.rs"]
mod tests;
