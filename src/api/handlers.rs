//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ChatAccepted, ChatRequest, ClosedResponse, ErrorResponse, OpenSessionResponse,
    TranscriptResponse,
};
use super::AppState;
use crate::runtime::SessionError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session creation; the response carries the greeting
        .route("/api/sessions", post(open_session))
        // Transcript snapshot
        .route("/api/sessions/:id", get(get_transcript))
        // Inbound visitor messages
        .route("/api/sessions/:id/chat", post(send_chat))
        // SSE relay of turns, fragments, and errors
        .route("/api/sessions/:id/stream", get(stream_session))
        // Session teardown
        .route("/api/sessions/:id/close", post(close_session))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn open_session(State(state): State<AppState>) -> Json<OpenSessionResponse> {
    let (session_id, greeting) = state.sessions.open().await;
    Json(OpenSessionResponse {
        session_id,
        greeting,
    })
}

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatAccepted>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("message text is empty".to_string()));
    }

    state.sessions.message(&id, req.text).await?;
    Ok(Json(ChatAccepted { accepted: true }))
}

async fn get_transcript(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TranscriptResponse>, AppError> {
    let turns = state.sessions.transcript(&id).await?;
    Ok(Json(TranscriptResponse {
        session_id: id,
        turns,
    }))
}

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let rx = state.sessions.subscribe(&id).await?;
    Ok(sse_stream(rx))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClosedResponse>, AppError> {
    state.sessions.close(&id).await?;
    Ok(Json(ClosedResponse { closed: true }))
}

async fn healthz() -> &'static str {
    "ok"
}

// ============================================================
// Error handling
// ============================================================

/// API error with status mapping
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UnknownSession(_) => AppError::NotFound(err.to_string()),
            SessionError::TurnInFlight => AppError::Conflict(err.to_string()),
            SessionError::ChannelClosed => AppError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m),
            AppError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
