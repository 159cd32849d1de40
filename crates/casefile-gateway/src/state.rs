use std::sync::Arc;

use casefile_domain::config::Config;
use casefile_sessions::SessionManager;

/// Shared application state passed to every API handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
}
