//! Error-to-HTTP mapping (spec §4.6/§7/SPEC_FULL §13).
//!
//! `AgentFailure`, `PersistenceFailure`, and `Internal` are never expected
//! to reach a handler directly — they're recorded on the session and
//! surfaced as an `error` SSE event instead — but a 500 fallback is kept
//! here so a future caller of this mapping can't panic on an unmapped
//! variant.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use casefile_domain::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, detail) = match &self.0 {
            Error::MalformedInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Error::Admission(msg) => (StatusCode::TOO_MANY_REQUESTS, msg.clone()),
            // "no thread" is a 400 per spec §7; every other precondition
            // failure (already running, not running) is a 409.
            Error::PreconditionFailed(msg) if msg.contains("no thread") => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            Error::PreconditionFailed(msg) => (StatusCode::CONFLICT, msg.clone()),
            other => {
                tracing::error!(error = %other, "unexpected error reached the HTTP boundary");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_owned())
            }
        };
        (status, Json(serde_json::json!({ "error": detail }))).into_response()
    }
}
