pub mod error;
pub mod sessions;
pub mod stream;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router (spec §6.1). Authentication is out of scope
/// (spec §1 — an external collaborator contract, not specified here), so
/// unlike the reference gateway's public/protected split this router has
/// no auth middleware and takes no state until `main` applies the
/// process-wide layers and calls `.with_state`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(sessions::create_session))
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/:id", get(sessions::get_session))
        .route("/sessions/:id", delete(sessions::delete_session))
        .route("/sessions/:id/stream", get(stream::stream_session))
        .route("/sessions/:id/cancel", post(sessions::cancel_session))
        .route("/sessions/:id/message", post(sessions::send_message))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
