//! Session management endpoints (spec §6.1).

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use super::error::ApiError;
use crate::state::AppState;

// ── POST /sessions ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    pub scenario: String,
    pub alert_text: String,
}

/// `POST /sessions` (spec §6.1): creates the session and immediately
/// starts it — there is no separate "start" endpoint on the HTTP surface,
/// so this handler calls `create` then `start` back to back, matching
/// the response shape `{session_id, status}`.
pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.scenario.trim().is_empty() || body.alert_text.trim().is_empty() {
        return Err(ApiError(casefile_domain::Error::MalformedInput(
            "scenario and alert_text are required".into(),
        )));
    }

    let live = state.sessions.create(body.scenario, body.alert_text)?;
    state.sessions.start(&live);
    let snapshot = live.snapshot();

    Ok(Json(serde_json::json!({
        "session_id": snapshot.id,
        "status": snapshot.status,
    })))
}

// ── GET /sessions ────────────────────────────────────────────────────

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sessions.list_all().await)
}

// ── GET /sessions/{id} ───────────────────────────────────────────────

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .sessions
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError(casefile_domain::Error::NotFound(id)))
}

// ── POST /sessions/{id}/cancel ───────────────────────────────────────

pub async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    // Idempotent (spec §6.1): always 200, even if the session was not
    // running or does not exist.
    state.sessions.cancel(&id);
    Json(serde_json::json!({
        "status": "cancelling",
        "message": "cancellation requested",
    }))
}

// ── POST /sessions/{id}/message ──────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    pub text: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.text.trim().is_empty() {
        return Err(ApiError(casefile_domain::Error::MalformedInput(
            "text is required".into(),
        )));
    }
    let event_offset = state.sessions.send_follow_up(&id, body.text)?;
    Ok(Json(serde_json::json!({ "event_offset": event_offset })))
}

// ── DELETE /sessions/{id} ─────────────────────────────────────────────

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.sessions.delete(&id).await;
    Json(serde_json::json!({ "deleted": true }))
}
