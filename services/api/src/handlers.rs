//! Axum handlers for the voice session REST API.
//!
//! Session establishment is two-phase: `start_voice_session` returns at
//! once with a pending session id, and clients poll
//! `get_voice_session_status` until it reports `ready` before opening
//! the websocket. `utoipa` doc attributes generate the OpenAPI spec.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::error;

use crate::{
    models::{CloseSessionResponse, ErrorResponse, StartSessionResponse},
    state::AppState,
};

pub enum ApiError {
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Start establishing a voice session for a patient.
#[utoipa::path(
    post,
    path = "/voice/start/{subject_id}",
    params(
        ("subject_id" = String, Path, description = "Patient whose context the session loads")
    ),
    responses(
        (status = 200, description = "Session creation accepted", body = StartSessionResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "voice"
)]
pub async fn start_voice_session(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = state.registry.create(&subject_id).await;
    let status = state
        .registry
        .status(&session_id)
        .await
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    Ok(Json(StartSessionResponse {
        poll_url: format!("/voice/status/{session_id}"),
        websocket_url: format!("/voice-session/{session_id}"),
        message: "Session is being established. Poll the status URL until it is ready."
            .to_string(),
        session_id,
        subject_id,
        status: status.status,
    }))
}

/// Report the current state of a voice session.
#[utoipa::path(
    get,
    path = "/voice/status/{session_id}",
    params(
        ("session_id" = String, Path, description = "Voice session identifier")
    ),
    responses(
        (status = 200, description = "Current session status", body = crate::models::SessionStatusResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "voice"
)]
pub async fn get_voice_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state
        .registry
        .status(&session_id)
        .await
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;
    Ok(Json(status))
}

/// Close a voice session and release its upstream connection.
#[utoipa::path(
    delete,
    path = "/voice/session/{session_id}",
    params(
        ("session_id" = String, Path, description = "Voice session identifier")
    ),
    responses(
        (status = 200, description = "Session closed", body = CloseSessionResponse)
    ),
    tag = "voice"
)]
pub async fn close_voice_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    // Deliberately idempotent: closing an unknown id reports closed too.
    state.registry.close(&session_id).await;
    Json(CloseSessionResponse {
        status: "closed".to_string(),
        session_id,
    })
}
