use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;

use va_core::error::CoreError;
use va_core::session::SessionId;
use va_core::settings::TemporaryOverride;

use crate::transport::AppState;

/// Maps `CoreError` onto the HTTP surface (SPEC_FULL §7.1). Every
/// fallible handler below funnels its `Result<_, CoreError>` through
/// `?`, converging here.
impl IntoResponse for CoreErrorResponse {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::NoContent(_) => StatusCode::NOT_FOUND,
            CoreError::InvalidFrame(_)
            | CoreError::InvalidMindMap(_)
            | CoreError::Json(_)
            | CoreError::Toml(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

pub struct CoreErrorResponse(pub CoreError);

impl From<CoreError> for CoreErrorResponse {
    fn from(e: CoreError) -> Self {
        CoreErrorResponse(e)
    }
}

type ApiResult<T> = Result<T, CoreErrorResponse>;

/// `POST /settings/apply-temporary` (SPEC_FULL §6).
pub async fn apply_temporary_settings(
    State(state): State<AppState>,
    Json(patch): Json<TemporaryOverride>,
) -> ApiResult<Json<serde_json::Value>> {
    state.settings.set(patch).await;
    let profile = state.store.get_settings_profile().await?;
    let effective = profile.resolve(Some(&state.settings.get()));
    Ok(Json(serde_json::to_value(effective).unwrap_or_default()))
}

/// `GET /settings/temporary-settings`.
pub async fn get_temporary_settings(State(state): State<AppState>) -> Json<TemporaryOverride> {
    Json(state.settings.get())
}

/// `DELETE /settings/temporary-settings`.
pub async fn clear_temporary_settings(State(state): State<AppState>) -> StatusCode {
    state.settings.clear().await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
pub struct ProcessingStatusResponse {
    pub summary_processing: bool,
    pub mind_map_processing: bool,
    pub any_processing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mind_map_start_time: Option<DateTime<Utc>>,
}

/// `GET /processing-status/{session_id}` (SPEC_FULL §6).
pub async fn processing_status(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Json<ProcessingStatusResponse> {
    let status = state.processing_state.status(&session_id);
    Json(ProcessingStatusResponse {
        summary_processing: status.summary_busy,
        mind_map_processing: status.mind_map_busy,
        any_processing: status.any_processing(),
        summary_start_time: status.summary_started_at,
        mind_map_start_time: status.mind_map_started_at,
    })
}

/// `GET /sessions/{id}/transcripts` (SPEC_FULL §6.1).
pub async fn list_transcripts(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<Vec<va_core::session::Transcript>>> {
    Ok(Json(state.store.list_transcripts(&session_id).await?))
}

/// `GET /sessions/{id}/analyses` (SPEC_FULL §6.1).
pub async fn list_analyses(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<Vec<va_core::session::Analysis>>> {
    Ok(Json(state.store.list_analyses(&session_id).await?))
}

/// `GET /sessions/{id}/mind-maps` (SPEC_FULL §6.1, exercised by scenario S6).
pub async fn list_mind_maps(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<Vec<va_core::session::MindMap>>> {
    Ok(Json(state.store.list_mind_maps(&session_id).await?))
}
