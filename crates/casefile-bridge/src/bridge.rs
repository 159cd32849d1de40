use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use casefile_domain::error::AgentFailureKind;
use casefile_domain::event::{Event, EventKind};
use casefile_domain::session::{RunMeta, StepSummary};
use casefile_domain::{Error, Result};
use casefile_sessions::{LiveSession, TurnRunner};
use chrono::Utc;
use uuid::Uuid;

use crate::runtime::{AgentRuntime, RuntimeCallback, RuntimeRun};
use crate::visualization::parse_subagent_output;

/// Adapts an `AgentRuntime` into a `TurnRunner` (spec §4.2). Owns the
/// retry policy and the callback-to-event translation; the runtime
/// itself only speaks callbacks.
pub struct AgentBridge {
    runtime: Arc<dyn AgentRuntime>,
    max_attempts: usize,
}

impl AgentBridge {
    pub fn new(runtime: Arc<dyn AgentRuntime>, max_attempts: usize) -> Self {
        Self {
            runtime,
            max_attempts,
        }
    }

    /// Drive a single attempt at a turn through to `run_complete`/`error`.
    /// Returns `Err` for the outer retry loop to classify; on success the
    /// session has already been updated with `diagnosis`/`run_meta`/`steps`.
    async fn attempt(
        &self,
        session: &Arc<LiveSession>,
        prompt: &str,
        thread_id: Option<String>,
        turn: u32,
    ) -> Result<()> {
        let run_id = Uuid::new_v4().to_string();
        session.push_event(Event::new(
            EventKind::RunStart,
            turn,
            serde_json::json!({ "run_id": run_id, "alert": prompt, "timestamp": Utc::now() }),
        ));

        let RuntimeRun {
            thread_id: mut current_thread,
            mut callbacks,
        } = self.runtime.run(prompt, thread_id).await?;

        let mut thread_announced = false;
        if turn == 0 {
            if let Some(tid) = current_thread.clone() {
                session.mutate(|s| s.thread_id = Some(tid.clone()));
                session.push_event(Event::new(
                    EventKind::ThreadCreated,
                    turn,
                    serde_json::json!({ "thread_id": tid }),
                ));
                thread_announced = true;
            }
        }

        let mut tool_cache: HashMap<String, serde_json::Value> = HashMap::new();
        let mut steps: Vec<StepSummary> = Vec::new();
        let mut message_text = String::new();

        while let Some(callback) = callbacks.recv().await {
            match callback {
                RuntimeCallback::ThreadCreated { thread_id: tid } => {
                    current_thread = Some(tid.clone());
                    session.mutate(|s| s.thread_id = Some(tid.clone()));
                    if turn == 0 && !thread_announced {
                        session.push_event(Event::new(
                            EventKind::ThreadCreated,
                            turn,
                            serde_json::json!({ "thread_id": tid }),
                        ));
                        thread_announced = true;
                    }
                }
                RuntimeCallback::StepThinking { agent, status } => {
                    session.push_event(Event::new(
                        EventKind::StepThinking,
                        turn,
                        serde_json::json!({ "agent": agent, "status": status }),
                    ));
                }
                RuntimeCallback::StepStarted {
                    step,
                    agent,
                    query,
                    reasoning,
                } => {
                    session.push_event(Event::new(
                        EventKind::StepStarted,
                        turn,
                        serde_json::json!({
                            "step": step,
                            "agent": agent,
                            "query": query,
                            "reasoning": reasoning,
                            "timestamp": Utc::now(),
                        }),
                    ));
                }
                RuntimeCallback::ToolOutput { call_id, output } => {
                    tool_cache.insert(call_id, output);
                }
                RuntimeCallback::StepCompleted {
                    step,
                    agent,
                    duration,
                    query,
                    response,
                    reasoning,
                    tool_call_id,
                    action,
                } => {
                    let cached_tool_output = tool_call_id.and_then(|id| tool_cache.get(&id).cloned());
                    let visualizations =
                        cached_tool_output.unwrap_or_else(|| parse_subagent_output(&response));
                    let is_action = action.is_some();
                    let action_name = action.as_ref().map(|a| a.action_name.clone());

                    let payload = serde_json::json!({
                        "step": step,
                        "agent": agent,
                        "duration": duration,
                        "query": query,
                        "response": response,
                        "visualizations": visualizations,
                        "reasoning": reasoning,
                        "is_action": is_action,
                        "action": action_name,
                    });
                    session.push_event(Event::new(EventKind::StepResponse, turn, payload.clone()));
                    session.push_event(Event::new(EventKind::StepComplete, turn, payload));

                    if let Some(action) = action {
                        session.push_event(Event::new(
                            EventKind::ActionExecuted,
                            turn,
                            serde_json::json!({
                                "step": step,
                                "action_name": action.action_name,
                                "action_data": action.action_data,
                                "timestamp": Utc::now(),
                            }),
                        ));
                    }

                    steps.push(StepSummary {
                        step,
                        agent,
                        duration,
                        query,
                        response,
                        visualizations: Some(visualizations),
                        reasoning,
                        is_action: Some(is_action),
                        action: action_name,
                    });
                }
                RuntimeCallback::MessageDelta { text } => {
                    message_text.push_str(&text);
                }
                RuntimeCallback::RunCompleted {
                    steps: step_count,
                    tokens,
                    time,
                } => {
                    if message_text.is_empty() {
                        if let Some(tid) = &current_thread {
                            if let Ok(Some(fallback)) =
                                self.runtime.last_assistant_message(tid).await
                            {
                                message_text = fallback;
                            }
                        }
                    }

                    session.push_event(Event::new(
                        EventKind::Message,
                        turn,
                        serde_json::json!({ "text": message_text }),
                    ));
                    session.push_event(Event::new(
                        EventKind::RunComplete,
                        turn,
                        serde_json::json!({ "steps": step_count, "tokens": tokens, "time": time }),
                    ));

                    session.mutate(|s| {
                        s.diagnosis = Some(message_text.clone());
                        s.run_meta = Some(RunMeta {
                            steps: step_count,
                            tokens,
                            time,
                        });
                        s.steps = steps.clone();
                    });
                    return Ok(());
                }
                RuntimeCallback::Error { message } => {
                    return Err(Error::classify_agent_failure(message));
                }
            }
        }

        Err(Error::agent_transient(
            "agent runtime closed its callback channel without completing the run",
        ))
    }
}

#[async_trait]
impl TurnRunner for AgentBridge {
    /// Retry policy (spec §4.2): one retry (`MAX_ATTEMPTS` total), except
    /// capacity/rate-limit failures, which are never retried. Cancellation
    /// is consulted only between attempts, never mid-call.
    async fn run_turn(&self, session: Arc<LiveSession>, prompt: String, thread_id: Option<String>) {
        let turn = session.snapshot().turn_count;
        let mut current_thread = thread_id;
        let mut attempt = 1;

        loop {
            match self
                .attempt(&session, &prompt, current_thread.clone(), turn)
                .await
            {
                Ok(()) => return,
                Err(err) => {
                    let is_capacity = matches!(
                        err,
                        Error::AgentFailure {
                            kind: AgentFailureKind::Capacity,
                            ..
                        }
                    );
                    tracing::warn!(attempt, error = %err, "agent turn attempt failed");

                    if session.cancel.is_cancelled() {
                        return;
                    }
                    if is_capacity || attempt >= self.max_attempts {
                        session.mutate(|s| s.error_detail = err.to_string());
                        session.push_event(Event::new(
                            EventKind::Error,
                            turn,
                            serde_json::json!({ "message": err.to_string() }),
                        ));
                        return;
                    }

                    current_thread = session.snapshot().thread_id;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casefile_domain::session::{Session, SessionStatus};
    use tokio::sync::mpsc;

    struct StubRuntime {
        thread_id: String,
    }

    #[async_trait]
    impl AgentRuntime for StubRuntime {
        async fn run(&self, _prompt: &str, thread_id: Option<String>) -> Result<RuntimeRun> {
            let (tx, rx) = mpsc::channel(16);
            let tid = thread_id.unwrap_or_else(|| self.thread_id.clone());
            tokio::spawn(async move {
                let _ = tx
                    .send(RuntimeCallback::StepStarted {
                        step: 1,
                        agent: "recon".into(),
                        query: Some("who".into()),
                        reasoning: None,
                    })
                    .await;
                let _ = tx
                    .send(RuntimeCallback::StepCompleted {
                        step: 1,
                        agent: "recon".into(),
                        duration: 1.2,
                        query: "who".into(),
                        response: "plain text finding".into(),
                        reasoning: None,
                        tool_call_id: None,
                        action: None,
                    })
                    .await;
                let _ = tx
                    .send(RuntimeCallback::MessageDelta {
                        text: "done".into(),
                    })
                    .await;
                let _ = tx
                    .send(RuntimeCallback::RunCompleted {
                        steps: 1,
                        tokens: 42,
                        time: 1.5,
                    })
                    .await;
            });
            Ok(RuntimeRun {
                thread_id: Some(tid),
                callbacks: rx,
            })
        }

        async fn last_assistant_message(&self, _thread_id: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

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

    fn live_session() -> Arc<LiveSession> {
        Arc::new(LiveSession::new(
            Session::new("s1".into(), "phishing".into(), "A".into()),
            500,
        ))
    }

    #[tokio::test]
    async fn single_turn_happy_path_sets_thread_and_diagnosis() {
        let bridge = AgentBridge::new(
            Arc::new(StubRuntime {
                thread_id: "T".into(),
            }),
            2,
        );
        let session = live_session();
        bridge
            .run_turn(session.clone(), "A".into(), None)
            .await;

        let snap = session.snapshot();
        assert_eq!(snap.thread_id.as_deref(), Some("T"));
        assert_eq!(snap.diagnosis.as_deref(), Some("done"));
        assert_eq!(snap.error_detail, "");
        assert_eq!(snap.steps.len(), 1);

        let has_thread_created = snap
            .event_log
            .iter()
            .any(|e| e.event == EventKind::ThreadCreated);
        assert!(has_thread_created);
    }

    #[tokio::test]
    async fn capacity_error_is_not_retried() {
        let bridge = AgentBridge::new(Arc::new(CapacityErrorRuntime), 2);
        let session = live_session();
        bridge
            .run_turn(session.clone(), "A".into(), None)
            .await;

        let snap = session.snapshot();
        assert!(snap.error_detail.contains("429"));
        let run_starts = snap
            .event_log
            .iter()
            .filter(|e| e.event == EventKind::RunStart)
            .count();
        assert_eq!(run_starts, 1, "capacity errors must not be retried");
    }

    #[tokio::test]
    async fn cancellation_between_attempts_skips_retry_without_error_detail() {
        struct AlwaysFailsRuntime;
        #[async_trait]
        impl AgentRuntime for AlwaysFailsRuntime {
            async fn run(&self, _prompt: &str, _thread_id: Option<String>) -> Result<RuntimeRun> {
                let (tx, rx) = mpsc::channel(4);
                tokio::spawn(async move {
                    let _ = tx
                        .send(RuntimeCallback::Error {
                            message: "connection reset".into(),
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

        let bridge = AgentBridge::new(Arc::new(AlwaysFailsRuntime), 2);
        let session = live_session();
        session.cancel.cancel();
        bridge
            .run_turn(session.clone(), "A".into(), None)
            .await;

        let snap = session.snapshot();
        assert_eq!(snap.error_detail, "");
        assert_eq!(snap.status, SessionStatus::Pending);
    }

    #[tokio::test]
    async fn thread_id_is_not_re_announced_on_a_follow_up_turn() {
        let bridge = AgentBridge::new(
            Arc::new(StubRuntime {
                thread_id: "T".into(),
            }),
            2,
        );
        let session = live_session();
        session.mutate(|s| s.turn_count = 1);
        bridge
            .run_turn(session.clone(), "B".into(), Some("T".into()))
            .await;

        let snap = session.snapshot();
        let thread_created_events = snap
            .event_log
            .iter()
            .filter(|e| e.event == EventKind::ThreadCreated)
            .count();
        assert_eq!(thread_created_events, 0);
    }
}
