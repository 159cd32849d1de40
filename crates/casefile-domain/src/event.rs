//! The event log's unit of record (spec §3 "Event", §6.2 SSE schema).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single immutable event appended to a session's event log.
///
/// `data` is kept as a `serde_json::Value` rather than a typed payload per
/// tag: the bridge builds events from several independent sources (the
/// runtime's callbacks, the sub-agent output parser, the session manager's
/// own bookkeeping) and the log must accept whatever any of them produce,
/// including malformed data, without ever refusing to append (spec §4.1
/// failure semantics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event: EventKind,
    pub turn: u32,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event: EventKind, turn: u32, data: serde_json::Value) -> Self {
        Self {
            event,
            turn,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Discriminant tag for an event (spec §6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UserMessage,
    RunStart,
    ThreadCreated,
    StepThinking,
    StepStarted,
    StepResponse,
    StepComplete,
    ActionExecuted,
    Message,
    RunComplete,
    Error,
    StatusChange,
    Heartbeat,
    Done,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserMessage => "user_message",
            Self::RunStart => "run_start",
            Self::ThreadCreated => "thread_created",
            Self::StepThinking => "step_thinking",
            Self::StepStarted => "step_started",
            Self::StepResponse => "step_response",
            Self::StepComplete => "step_complete",
            Self::ActionExecuted => "action_executed",
            Self::Message => "message",
            Self::RunComplete => "run_complete",
            Self::Error => "error",
            Self::StatusChange => "status_change",
            Self::Heartbeat => "heartbeat",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
