use std::sync::Arc;

use async_trait::async_trait;

use crate::live::LiveSession;

/// The agent bridge's side of the Session Manager ↔ Agent Bridge boundary
/// (spec §2, §4.2). `casefile-bridge` implements this against
/// `casefile-sessions`'s own `LiveSession`, so the manager never depends
/// on the bridge crate directly.
#[async_trait]
pub trait TurnRunner: Send + Sync {
    /// Drive one turn of the agent workflow against `session`, pushing
    /// events as they happen (spec §4.2 event sequence) and writing
    /// `thread_id` / `error_detail` onto the session directly. Must poll
    /// `session.cancel` cooperatively between retry attempts (spec §4.6)
    /// and must return once the turn is fully settled — the manager
    /// finalizes status as soon as this call returns.
    async fn run_turn(&self, session: Arc<LiveSession>, prompt: String, thread_id: Option<String>);
}
