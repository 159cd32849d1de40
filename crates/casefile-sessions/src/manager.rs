use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use casefile_domain::config::SessionsConfig;
use casefile_domain::event::{Event, EventKind};
use casefile_domain::session::{Session, SessionStatus, SessionSummary};
use casefile_domain::trace::TraceEvent;
use casefile_domain::{Error, Result};
use casefile_store::{DocumentStore, SessionDocument};
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::live::LiveSession;
use crate::recent::RecentRing;
use crate::runner::TurnRunner;

/// Process-wide registry of active and recently-completed sessions
/// (spec §2, §3, §4.4). Owns admission control, turn lifecycle,
/// eviction, and the startup recovery pass.
pub struct SessionManager {
    active: RwLock<HashMap<String, Arc<LiveSession>>>,
    recent: RwLock<RecentRing>,
    store: Arc<dyn DocumentStore>,
    persistence: Arc<casefile_store::PersistenceWorker>,
    runner: Arc<dyn TurnRunner>,
    max_active: usize,
    max_event_log: usize,
    idle_timeout: Duration,
}

impl SessionManager {
    /// Construct the manager and run the crash-recovery pass (spec §4.3
    /// "Recovery (startup)") before accepting any traffic.
    pub async fn bootstrap(
        store: Arc<dyn DocumentStore>,
        runner: Arc<dyn TurnRunner>,
        config: &SessionsConfig,
    ) -> Arc<Self> {
        let persistence = Arc::new(casefile_store::PersistenceWorker::new(store.clone()));
        let recovered = persistence.recover_in_progress().await;
        if recovered > 0 {
            tracing::info!(recovered, "recovery pass marked stale sessions failed");
        }

        Arc::new(Self {
            active: RwLock::new(HashMap::new()),
            recent: RwLock::new(RecentRing::new(config.max_recent)),
            store,
            persistence,
            runner,
            max_active: config.max_active,
            max_event_log: config.max_event_log,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        })
    }

    /// `create` (spec §4.4): does not start the run.
    pub fn create(&self, scenario: String, alert_text: String) -> Result<Arc<LiveSession>> {
        let mut active = self.active.write();
        if active.len() >= self.max_active {
            return Err(Error::Admission(format!(
                "active session limit ({}) reached",
                self.max_active
            )));
        }

        let id = Uuid::new_v4().to_string();
        let session = Session::new(id.clone(), scenario.clone(), alert_text);
        let live = Arc::new(LiveSession::new(session, self.max_event_log));
        active.insert(id.clone(), live.clone());

        TraceEvent::SessionCreated {
            session_id: id,
            scenario,
            active_count: active.len(),
        }
        .emit();

        Ok(live)
    }

    /// `start` (spec §4.4): idempotent for `Pending` sessions.
    pub fn start(self: &Arc<Self>, session: &Arc<LiveSession>) {
        let started = session.mutate(|s| {
            if s.status == SessionStatus::Pending {
                s.status = SessionStatus::InProgress;
                true
            } else {
                false
            }
        });
        if !started {
            return;
        }

        let alert_text = session.snapshot().alert_text;
        session.push_event(Event::new(
            EventKind::UserMessage,
            0,
            serde_json::json!({ "text": alert_text }),
        ));

        let id = session.snapshot().id;
        TraceEvent::SessionStarted {
            session_id: id,
            turn: 0,
        }
        .emit();

        self.spawn_turn(session.clone(), alert_text, None);
    }

    /// `send_follow_up` (spec §4.4).
    pub fn send_follow_up(self: &Arc<Self>, id: &str, text: String) -> Result<usize> {
        let session = self
            .active
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_owned()))?;

        let snapshot = session.snapshot();
        if snapshot.status == SessionStatus::InProgress {
            return Err(Error::PreconditionFailed(
                "session already running".into(),
            ));
        }
        let Some(thread_id) = snapshot.thread_id.clone() else {
            return Err(Error::PreconditionFailed(
                "session has no thread yet".into(),
            ));
        };

        if let Some(handle) = session.idle_finalizer.lock().take() {
            handle.abort();
        }
        session.cancel.reset();

        // `turn_count` already holds this turn's 0-based index — it was
        // advanced to that value by the previous turn's `finalize_turn`,
        // not here (see its doc comment for why incrementing twice would
        // desync the index the bridge emits from the persisted count).
        let turn = session.mutate(|s| {
            s.error_detail.clear();
            s.status = SessionStatus::InProgress;
            s.turn_count
        });

        let event_offset = session.event_count();
        session.push_event(Event::new(
            EventKind::UserMessage,
            turn,
            serde_json::json!({ "text": text }),
        ));

        TraceEvent::SessionStarted {
            session_id: id.to_owned(),
            turn,
        }
        .emit();

        self.spawn_turn(session, text, Some(thread_id));
        Ok(event_offset)
    }

    /// `cancel` (spec §4.4): no-op unless the session is `InProgress`.
    pub fn cancel(&self, id: &str) {
        let Some(session) = self.active.read().get(id).cloned() else {
            return;
        };
        let snapshot = session.snapshot();
        if snapshot.status != SessionStatus::InProgress {
            return;
        }
        session.cancel.cancel();
        session.push_event(Event::new(
            EventKind::StatusChange,
            snapshot.turn_count,
            serde_json::json!({ "status": "cancelling", "message": "cancellation requested" }),
        ));
    }

    /// `delete` (spec §4.4): cancels if running, drops in-memory state,
    /// and deletes from the document store.
    pub async fn delete(&self, id: &str) {
        self.cancel(id);

        let from_memory = {
            let mut active = self.active.write();
            active.remove(id)
        }
        .or_else(|| self.recent.write().remove(id));

        let scenario = match from_memory {
            Some(live) => Some(live.snapshot().scenario),
            None => self.find_in_store(id).await.map(|d| d.session.scenario),
        };

        if let Some(scenario) = scenario {
            if let Err(err) = self.store.delete(id, &scenario).await {
                tracing::warn!(session_id = id, error = %err, "failed to delete session from store");
            }
        }
    }

    /// In-memory session lookup, used by `stream`/`cancel`/`send_follow_up`.
    pub fn get_live(&self, id: &str) -> Option<Arc<LiveSession>> {
        self.active
            .read()
            .get(id)
            .cloned()
            .or_else(|| self.recent.read().get(id))
    }

    /// `get` (spec §4.4): falls back to a store hydration for sessions
    /// that have left both in-memory maps.
    pub async fn get(&self, id: &str) -> Option<Session> {
        if let Some(live) = self.get_live(id) {
            return Some(live.snapshot());
        }
        self.find_in_store(id).await.map(|d| d.session)
    }

    async fn find_in_store(&self, id: &str) -> Option<SessionDocument> {
        self.store
            .list(None)
            .await
            .ok()?
            .into_iter()
            .find(|d| d.session.id == id)
    }

    /// `list_all` (spec §4.4): union of in-memory sessions and the
    /// store, deduplicated by id with in-memory winning, newest first.
    pub async fn list_all(&self) -> Vec<SessionSummary> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        for session in self.active.read().values() {
            let summary = session.snapshot().summary();
            seen.insert(summary.id.clone());
            out.push(summary);
        }
        for session in self.recent.read().iter() {
            let summary = session.snapshot().summary();
            if seen.insert(summary.id.clone()) {
                out.push(summary);
            }
        }
        if let Ok(docs) = self.store.list(None).await {
            for doc in docs {
                let summary = doc.session.summary();
                if seen.insert(summary.id.clone()) {
                    out.push(summary);
                }
            }
        }

        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    /// `stream` (spec §4.4, §4.5): delegates to `LiveSession::subscribe`.
    /// Returns `None` for sessions that exist only in the document store
    /// (they have no subscriber registry — nothing to tail).
    pub fn stream(
        &self,
        id: &str,
        since_index: usize,
    ) -> Option<(Vec<Event>, mpsc::Receiver<Event>, u64, Arc<LiveSession>)> {
        let live = self.get_live(id)?;
        let (history, rx, sub_id) = live.subscribe(since_index);
        Some((history, rx, sub_id, live))
    }

    fn spawn_turn(self: &Arc<Self>, session: Arc<LiveSession>, prompt: String, thread_id: Option<String>) {
        let manager = self.clone();
        tokio::spawn(manager.drive_turn(session, prompt, thread_id));
    }

    /// Run the bridge and finalize. Split out from `spawn_turn` so tests
    /// can await it directly instead of racing a background task.
    pub(crate) async fn drive_turn(
        self: Arc<Self>,
        session: Arc<LiveSession>,
        prompt: String,
        thread_id: Option<String>,
    ) {
        self.runner
            .run_turn(session.clone(), prompt, thread_id)
            .await;
        self.finalize_turn(session).await;
    }

    /// Turn finalization (spec §4.4).
    ///
    /// `turn_count` doubles as the 0-based index the bridge tagged this
    /// turn's events with (spec §4.2 `turn` = session's current turn
    /// number) *and* the persisted "turns completed" count spec §3
    /// requires (`turn_count` = one plus the number of observed
    /// `user_message` events of turn > 0). Both hold simultaneously only
    /// because the index is advanced here, once, after the turn settles —
    /// `start`/`send_follow_up` read but never bump it before spawning.
    async fn finalize_turn(self: Arc<Self>, session: Arc<LiveSession>) {
        let cancelled = session.cancel.is_cancelled();

        let (status, completed_turn) = session.mutate(|s| {
            s.updated_at = Utc::now();
            let completed_turn = s.turn_count;
            let status = if cancelled {
                SessionStatus::Cancelled
            } else if !s.error_detail.is_empty() {
                SessionStatus::Failed
            } else {
                SessionStatus::Completed
            };
            s.status = status;
            s.turn_count = completed_turn + 1;
            (status, completed_turn)
        });

        let snapshot = session.snapshot();
        self.persistence.persist(&snapshot).await;

        session.push_event(Event::new(
            EventKind::Done,
            completed_turn,
            serde_json::json!({ "status": status.as_str() }),
        ));

        TraceEvent::SessionFinalized {
            session_id: snapshot.id.clone(),
            status: status.as_str().to_string(),
            turn: completed_turn,
            steps: snapshot.steps.len() as u32,
        }
        .emit();

        match status {
            SessionStatus::Completed => self.schedule_idle_eviction(snapshot.id, session),
            SessionStatus::Cancelled | SessionStatus::Failed => self.evict_to_recent(&snapshot.id),
            SessionStatus::Pending | SessionStatus::InProgress => unreachable!(
                "finalize_turn only assigns terminal statuses"
            ),
        }
    }

    fn schedule_idle_eviction(self: &Arc<Self>, id: String, session: Arc<LiveSession>) {
        let manager = self.clone();
        let timeout = self.idle_timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if session.snapshot().status == SessionStatus::Completed {
                manager.evict_to_recent(&id);
            }
        });
        *session.idle_finalizer.lock() = Some(handle);
    }

    fn evict_to_recent(&self, id: &str) {
        let session = self.active.write().remove(id);
        let Some(session) = session else {
            return;
        };
        if let Some(evicted_id) = self.recent.write().push(id.to_owned(), session) {
            TraceEvent::SessionEvicted {
                session_id: evicted_id,
                reason: "recent queue capacity exceeded".into(),
            }
            .emit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use casefile_store::JsonFileStore;

    struct StubRunner;

    #[async_trait]
    impl TurnRunner for StubRunner {
        async fn run_turn(
            &self,
            session: Arc<LiveSession>,
            _prompt: String,
            thread_id: Option<String>,
        ) {
            let tid = thread_id.unwrap_or_else(|| "T".to_owned());
            session.mutate(|s| s.thread_id = Some(tid.clone()));
            session.push_event(Event::new(
                EventKind::Message,
                0,
                serde_json::json!({ "text": "done" }),
            ));
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl TurnRunner for FailingRunner {
        async fn run_turn(&self, session: Arc<LiveSession>, _prompt: String, _thread_id: Option<String>) {
            session.mutate(|s| s.error_detail = "boom".into());
        }
    }

    async fn manager_with(runner: Arc<dyn TurnRunner>, max_active: usize) -> Arc<SessionManager> {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn DocumentStore> = Arc::new(JsonFileStore::new(dir.path()).unwrap());
        let config = SessionsConfig {
            max_active,
            max_recent: 100,
            max_event_log: 500,
            idle_timeout_secs: 600,
        };
        SessionManager::bootstrap(store, runner, &config).await
    }

    #[tokio::test]
    async fn create_respects_admission_limit() {
        let manager = manager_with(Arc::new(StubRunner), 1).await;
        manager.create("s1".into(), "a".into()).unwrap();
        let err = manager.create("s1".into(), "b".into()).unwrap_err();
        assert!(matches!(err, Error::Admission(_)));
    }

    #[tokio::test]
    async fn admission_succeeds_after_eviction() {
        let manager = manager_with(Arc::new(StubRunner), 1).await;
        let live = manager.create("s1".into(), "a".into()).unwrap();
        manager.start(&live);
        manager.clone().drive_turn(live, "a".into(), None).await;

        // The completed session stays parked in `active` pending idle
        // eviction, so admission is governed by `evict_to_recent`, not
        // completion alone — force it out to make room.
        let id = manager.list_all().await[0].id.clone();
        manager.get_live(&id).unwrap().idle_finalizer.lock().take();
        manager.evict_to_recent(&id);

        manager.create("s1".into(), "c".into()).unwrap();
    }

    #[tokio::test]
    async fn start_pushes_turn_zero_user_message() {
        let manager = manager_with(Arc::new(StubRunner), 8).await;
        let live = manager.create("s1".into(), "alert text".into()).unwrap();
        manager.start(&live);

        assert_eq!(live.snapshot().status, SessionStatus::InProgress);
        let (history, _rx, _id) = live.subscribe(0);
        assert_eq!(history[0].event, EventKind::UserMessage);
        assert_eq!(history[0].data["text"], "alert text");
    }

    #[tokio::test]
    async fn completed_turn_finalizes_and_persists() {
        let manager = manager_with(Arc::new(StubRunner), 8).await;
        let live = manager.create("s1".into(), "a".into()).unwrap();
        manager.start(&live);
        manager.clone().drive_turn(live.clone(), "a".into(), None).await;

        assert_eq!(live.snapshot().status, SessionStatus::Completed);
        assert_eq!(live.snapshot().thread_id.as_deref(), Some("T"));
    }

    #[tokio::test]
    async fn turn_count_tracks_turns_completed_not_the_bridges_turn_index() {
        let manager = manager_with(Arc::new(StubRunner), 8).await;
        let live = manager.create("s1".into(), "a".into()).unwrap();
        manager.start(&live);
        manager.clone().drive_turn(live.clone(), "a".into(), None).await;
        assert_eq!(live.snapshot().turn_count, 1);

        let id = live.snapshot().id.clone();
        manager.send_follow_up(&id, "b".into()).unwrap();
        manager.clone().drive_turn(live.clone(), "b".into(), live.snapshot().thread_id).await;
        assert_eq!(live.snapshot().turn_count, 2);
    }

    #[tokio::test]
    async fn error_detail_wins_over_partial_diagnosis() {
        let manager = manager_with(Arc::new(FailingRunner), 8).await;
        let live = manager.create("s1".into(), "a".into()).unwrap();
        manager.start(&live);
        manager.clone().drive_turn(live.clone(), "a".into(), None).await;

        assert_eq!(live.snapshot().status, SessionStatus::Failed);
    }

    #[tokio::test]
    async fn cancelled_turn_finalizes_as_cancelled() {
        let manager = manager_with(Arc::new(StubRunner), 8).await;
        let live = manager.create("s1".into(), "a".into()).unwrap();
        manager.start(&live);
        live.cancel.cancel();
        manager.clone().drive_turn(live.clone(), "a".into(), None).await;

        assert_eq!(live.snapshot().status, SessionStatus::Cancelled);
        // Cancelled sessions move to Recent immediately.
        assert!(manager.get_live(&live.snapshot().id).is_some());
    }

    #[tokio::test]
    async fn send_follow_up_rejects_unknown_session() {
        let manager = manager_with(Arc::new(StubRunner), 8).await;
        let err = manager.send_follow_up("ghost", "hi".into()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn send_follow_up_rejects_in_progress_session() {
        let manager = manager_with(Arc::new(StubRunner), 8).await;
        let live = manager.create("s1".into(), "a".into()).unwrap();
        manager.start(&live);

        let err = manager
            .send_follow_up(&live.snapshot().id, "hi".into())
            .unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn send_follow_up_rejects_session_without_thread() {
        let manager = manager_with(Arc::new(FailingRunner), 8).await;
        let live = manager.create("s1".into(), "a".into()).unwrap();
        manager.start(&live);
        manager.clone().drive_turn(live.clone(), "a".into(), None).await;

        // FailingRunner never sets thread_id.
        let err = manager
            .send_follow_up(&live.snapshot().id, "hi".into())
            .unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn send_follow_up_returns_offset_at_new_turn_boundary() {
        let manager = manager_with(Arc::new(StubRunner), 8).await;
        let live = manager.create("s1".into(), "a".into()).unwrap();
        manager.start(&live);
        manager.clone().drive_turn(live.clone(), "a".into(), None).await;

        let offset_before = live.event_count();
        let offset = manager
            .send_follow_up(&live.snapshot().id, "b".into())
            .unwrap();
        assert_eq!(offset, offset_before);

        let (history, _rx, _id) = live.subscribe(offset);
        assert_eq!(history[0].event, EventKind::UserMessage);
        assert_eq!(history[0].data["text"], "b");
    }

    #[tokio::test]
    async fn cancel_is_noop_when_not_running() {
        let manager = manager_with(Arc::new(StubRunner), 8).await;
        let live = manager.create("s1".into(), "a".into()).unwrap();
        // Still Pending — cancel must do nothing observable.
        manager.cancel(&live.snapshot().id);
        assert_eq!(live.event_count(), 0);
    }

    #[tokio::test]
    async fn delete_removes_session_and_store_document() {
        let manager = manager_with(Arc::new(StubRunner), 8).await;
        let live = manager.create("s1".into(), "a".into()).unwrap();
        let id = live.snapshot().id;

        manager.delete(&id).await;
        assert!(manager.get_live(&id).is_none());
    }

    #[tokio::test]
    async fn list_all_is_sorted_newest_first() {
        let manager = manager_with(Arc::new(StubRunner), 8).await;
        manager.create("s1".into(), "a".into()).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        manager.create("s1".into(), "b".into()).unwrap();

        let all = manager.list_all().await;
        assert_eq!(all.len(), 2);
        assert!(all[0].updated_at >= all[1].updated_at);
    }
}
