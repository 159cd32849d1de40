use std::sync::Arc;
use std::time::Duration;

use casefile_domain::session::SessionStatus;
use casefile_domain::trace::TraceEvent;
use casefile_domain::Session;

use crate::document::{DocumentStore, SessionDocument};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF: [Duration; 2] = [Duration::from_secs(2), Duration::from_secs(4)];

/// Writes session snapshots through a `DocumentStore` with bounded retry
/// (spec §4.3). Never blocks the caller on final failure — it logs and
/// lets the caller keep the session in memory for a later opportunity.
pub struct PersistenceWorker {
    store: Arc<dyn DocumentStore>,
}

impl PersistenceWorker {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Persist a session snapshot. Retries up to `MAX_ATTEMPTS` with
    /// exponential backoff (2s, 4s). Returns `true` if the write
    /// eventually succeeded.
    pub async fn persist(&self, session: &Session) -> bool {
        let doc = SessionDocument::new(session.clone());
        for attempt in 1..=MAX_ATTEMPTS {
            match self.store.upsert(doc.clone()).await {
                Ok(()) => return true,
                Err(err) => {
                    TraceEvent::PersistFailed {
                        session_id: session.id.clone(),
                        attempt,
                        error: err.to_string(),
                    }
                    .emit();
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(BACKOFF[(attempt - 1) as usize]).await;
                    }
                }
            }
        }
        tracing::error!(
            session_id = %session.id,
            "persistence failed after {MAX_ATTEMPTS} attempts; retaining in memory"
        );
        false
    }

    /// Startup recovery pass (spec §4.3): mark every `InProgress` session
    /// document `Failed`, since it cannot be resumed across a restart.
    /// Failures here are logged but never block startup.
    pub async fn recover_in_progress(&self) -> usize {
        let stale = match self.store.list(Some(SessionStatus::InProgress)).await {
            Ok(docs) => docs,
            Err(err) => {
                tracing::error!(error = %err, "recovery pass: failed to list in-progress sessions");
                return 0;
            }
        };

        let mut recovered = 0;
        for mut doc in stale {
            let previous_status = doc.session.status.to_string();
            doc.session.status = SessionStatus::Failed;
            doc.session.error_detail =
                "Session was in progress when the server restarted; it cannot be resumed."
                    .to_owned();
            doc.session.updated_at = chrono::Utc::now();

            match self.store.upsert(doc.clone()).await {
                Ok(()) => {
                    recovered += 1;
                    TraceEvent::SessionRecovered {
                        session_id: doc.session.id.clone(),
                        previous_status,
                    }
                    .emit();
                }
                Err(err) => {
                    tracing::error!(
                        session_id = %doc.session.id,
                        error = %err,
                        "recovery pass: failed to rewrite session"
                    );
                }
            }
        }
        recovered
    }
}
