//! Concrete scenarios S1-S6 (spec §8), driving `SessionManager` directly
//! against a stub `AgentRuntime` (SPEC_FULL §14).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use casefile_bridge::{AgentBridge, AgentRuntime, RuntimeCallback, RuntimeRun};
use casefile_domain::config::SessionsConfig;
use casefile_domain::event::EventKind;
use casefile_domain::session::SessionStatus;
use casefile_domain::Result;
use casefile_sessions::{SessionManager, TurnRunner};
use casefile_store::{DocumentStore, JsonFileStore};
use tokio::sync::mpsc;

/// Poll a snapshot-producing closure until it returns `true` or the
/// timeout elapses. Turns are driven on a background `tokio::spawn`
/// (`SessionManager::start`), so tests observe completion by polling
/// rather than awaiting a future directly.
async fn wait_until<F: Fn() -> bool>(f: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !f() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within timeout");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn manager_with(
    runner: Arc<dyn TurnRunner>,
    max_active: usize,
) -> (Arc<SessionManager>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn DocumentStore> = Arc::new(JsonFileStore::new(dir.path()).unwrap());
    let config = SessionsConfig {
        max_active,
        max_recent: 100,
        max_event_log: 500,
        idle_timeout_secs: 600,
    };
    let manager = SessionManager::bootstrap(store, runner, &config).await;
    (manager, dir)
}

/// Emits `thread_created`, two steps, a final message, and completes —
/// the S1 happy-path double.
struct HappyPathRuntime;

#[async_trait]
impl AgentRuntime for HappyPathRuntime {
    async fn run(&self, _prompt: &str, thread_id: Option<String>) -> Result<RuntimeRun> {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let _ = tx
                .send(RuntimeCallback::ThreadCreated {
                    thread_id: "T".into(),
                })
                .await;
            for step in 0..2u32 {
                let _ = tx
                    .send(RuntimeCallback::StepStarted {
                        step,
                        agent: "recon".into(),
                        query: Some("who".into()),
                        reasoning: None,
                    })
                    .await;
                let _ = tx
                    .send(RuntimeCallback::StepCompleted {
                        step,
                        agent: "recon".into(),
                        duration: 0.5,
                        query: "who".into(),
                        response: format!("finding {step}"),
                        reasoning: None,
                        tool_call_id: None,
                        action: None,
                    })
                    .await;
            }
            let _ = tx
                .send(RuntimeCallback::MessageDelta {
                    text: "done".into(),
                })
                .await;
            let _ = tx
                .send(RuntimeCallback::RunCompleted {
                    steps: 2,
                    tokens: 10,
                    time: 1.0,
                })
                .await;
        });
        Ok(RuntimeRun {
            thread_id,
            callbacks: rx,
        })
    }

    async fn last_assistant_message(&self, _thread_id: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Never completes on its own — used to hold a session in `InProgress`
/// long enough for a test to cancel it mid-run (S3).
struct HangingRuntime;

#[async_trait]
impl AgentRuntime for HangingRuntime {
    async fn run(&self, _prompt: &str, thread_id: Option<String>) -> Result<RuntimeRun> {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let _ = tx
                .send(RuntimeCallback::ThreadCreated {
                    thread_id: "T".into(),
                })
                .await;
            // Hold the channel open without completing the run; the
            // bridge's `attempt` call stays parked on `callbacks.recv()`.
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        Ok(RuntimeRun {
            thread_id,
            callbacks: rx,
        })
    }

    async fn last_assistant_message(&self, _thread_id: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Always fails with a 429-flavoured message — the S6 double.
struct CapacityErrorRuntime;

#[async_trait]
impl AgentRuntime for CapacityErrorRuntime {
    async fn run(&self, _prompt: &str, _thread_id: Option<String>) -> Result<RuntimeRun> {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let _ = tx
                .send(RuntimeCallback::Error {
                    message: "upstream returned 429 too many requests".into(),
                })
                .await;
        });
        Ok(RuntimeRun {
            thread_id: None,
            callbacks: rx,
        })
    }

    async fn last_assistant_message(&self, _thread_id: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

// ── S1: Single-turn happy path ───────────────────────────────────────

#[tokio::test]
async fn s1_single_turn_happy_path() {
    let bridge: Arc<dyn TurnRunner> = Arc::new(AgentBridge::new(Arc::new(HappyPathRuntime), 2));
    let (manager, _dir) = manager_with(bridge, 8).await;

    let live = manager.create("s1".into(), "A".into()).unwrap();
    manager.start(&live);

    wait_until(|| live.snapshot().status != SessionStatus::InProgress).await;

    let snap = live.snapshot();
    assert_eq!(snap.status, SessionStatus::Completed);
    assert_eq!(snap.turn_count, 1);
    assert_eq!(snap.thread_id.as_deref(), Some("T"));
    assert_eq!(snap.diagnosis.as_deref(), Some("done"));

    assert_eq!(snap.event_log.first().unwrap().event, EventKind::UserMessage);
    assert_eq!(snap.event_log.first().unwrap().data["text"], "A");
    assert_eq!(snap.event_log.last().unwrap().event, EventKind::Done);
    assert!(snap
        .event_log
        .iter()
        .any(|e| e.event == EventKind::RunComplete));
}

// ── S2: Follow-up continuity ──────────────────────────────────────────

#[tokio::test]
async fn s2_follow_up_continuity() {
    let bridge: Arc<dyn TurnRunner> = Arc::new(AgentBridge::new(Arc::new(HappyPathRuntime), 2));
    let (manager, _dir) = manager_with(bridge, 8).await;

    let live = manager.create("s1".into(), "A".into()).unwrap();
    manager.start(&live);
    wait_until(|| live.snapshot().status != SessionStatus::InProgress).await;

    let id = live.snapshot().id.clone();
    let len_before = live.snapshot().event_log.len();

    let offset = manager.send_follow_up(&id, "B".into()).unwrap();
    assert_eq!(offset, len_before);

    wait_until(|| live.snapshot().status != SessionStatus::InProgress && live.snapshot().turn_count == 2).await;

    let snap = live.snapshot();
    let new_events = &snap.event_log[offset..];
    assert_eq!(new_events[0].event, EventKind::UserMessage);
    assert_eq!(new_events[0].data["text"], "B");
    assert_eq!(new_events[0].turn, 1);
}

// ── S3: Cancel mid-run ────────────────────────────────────────────────

#[tokio::test]
async fn s3_cancel_mid_run() {
    let bridge: Arc<dyn TurnRunner> = Arc::new(AgentBridge::new(Arc::new(HangingRuntime), 2));
    let (manager, _dir) = manager_with(bridge, 8).await;

    let live = manager.create("s1".into(), "A".into()).unwrap();
    manager.start(&live);

    wait_until(|| live.snapshot().status == SessionStatus::InProgress).await;
    let id = live.snapshot().id.clone();
    manager.cancel(&id);

    wait_until(|| {
        live.snapshot()
            .event_log
            .iter()
            .any(|e| e.event == EventKind::StatusChange)
    })
    .await;
    let status_change = live
        .snapshot()
        .event_log
        .iter()
        .find(|e| e.event == EventKind::StatusChange)
        .unwrap()
        .data
        .clone();
    assert_eq!(status_change["status"], "cancelling");

    assert!(live.cancel.is_cancelled());
}

// ── S4: Admission rejection ───────────────────────────────────────────

#[tokio::test]
async fn s4_admission_rejection() {
    let bridge: Arc<dyn TurnRunner> = Arc::new(AgentBridge::new(Arc::new(HangingRuntime), 2));
    let (manager, _dir) = manager_with(bridge, 1).await;

    manager.create("s1".into(), "A".into()).unwrap();
    let err = manager.create("s1".into(), "B".into()).unwrap_err();
    assert!(matches!(err, casefile_domain::Error::Admission(_)));
}

// ── S5: Crash recovery ────────────────────────────────────────────────

#[tokio::test]
async fn s5_crash_recovery() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store: Arc<dyn DocumentStore> = Arc::new(JsonFileStore::new(dir.path()).unwrap());
        let mut session =
            casefile_domain::Session::new("s1".into(), "phishing".into(), "A".into());
        session.status = SessionStatus::InProgress;
        store
            .upsert(casefile_store::SessionDocument::new(session))
            .await
            .unwrap();
    }

    let store: Arc<dyn DocumentStore> = Arc::new(JsonFileStore::new(dir.path()).unwrap());
    let bridge: Arc<dyn TurnRunner> = Arc::new(AgentBridge::new(Arc::new(HappyPathRuntime), 2));
    let config = SessionsConfig {
        max_active: 8,
        max_recent: 100,
        max_event_log: 500,
        idle_timeout_secs: 600,
    };
    SessionManager::bootstrap(store.clone(), bridge, &config).await;

    let recovered = store
        .list(None)
        .await
        .unwrap()
        .into_iter()
        .find(|d| d.session.id == "s1")
        .unwrap();
    assert_eq!(recovered.session.status, SessionStatus::Failed);
    assert!(!recovered.session.error_detail.is_empty());
}

// ── S6: Capacity error not retried ───────────────────────────────────

#[tokio::test]
async fn s6_capacity_error_not_retried() {
    let bridge: Arc<dyn TurnRunner> = Arc::new(AgentBridge::new(Arc::new(CapacityErrorRuntime), 2));
    let (manager, _dir) = manager_with(bridge, 8).await;

    let live = manager.create("s1".into(), "A".into()).unwrap();
    manager.start(&live);

    wait_until(|| live.snapshot().status != SessionStatus::InProgress).await;

    let snap = live.snapshot();
    assert_eq!(snap.status, SessionStatus::Failed);
    assert!(snap.error_detail.contains("429"));
    let run_starts = snap
        .event_log
        .iter()
        .filter(|e| e.event == EventKind::RunStart)
        .count();
    assert_eq!(run_starts, 1, "capacity errors must not be retried");
}
