//! The persisted half of a session (spec §3 "Session", §6.3 document shape).
//!
//! This struct holds exactly the fields that are serialised to the
//! document store and returned to HTTP clients. The runtime-only fields
//! spec §3 calls out (`subscribers`, `cancel_signal`, `idle_finalizer_handle`,
//! `lock`) live alongside this struct in `casefile-sessions::session`,
//! which wraps it for live use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;

pub const MAX_EVENT_LOG: usize = 500;

/// Status a session can be in (spec §3/§4.4 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// `true` for `Pending`/`InProgress` — the statuses that keep a
    /// session in the manager's *Active* map (spec §3 invariants).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    /// `true` for the three terminal statuses that move a session to the
    /// *Recent* queue.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest-turn completion statistics (spec §3 `run_meta`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMeta {
    pub steps: u32,
    pub tokens: u64,
    pub time: f64,
}

/// A single step's summary, derived from the latest turn's `step_complete`
/// events (spec §3 `steps`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSummary {
    pub step: u32,
    pub agent: String,
    pub duration: f64,
    pub query: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualizations: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_action: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// The persisted session document (spec §6.3).
///
/// `_docType` is always `"session"` and is carried by `casefile-store`'s
/// serialisation wrapper rather than as a field here (so in-memory use
/// never has to think about the discriminator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub scenario: String,
    pub alert_text: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub turn_count: u32,
    #[serde(default)]
    pub event_log: Vec<Event>,
    #[serde(default)]
    pub steps: Vec<StepSummary>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub run_meta: Option<RunMeta>,
    #[serde(default)]
    pub error_detail: String,
}

impl Session {
    pub fn new(id: String, scenario: String, alert_text: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            scenario,
            alert_text,
            status: SessionStatus::Pending,
            created_at: now,
            updated_at: now,
            thread_id: None,
            turn_count: 0,
            event_log: Vec::new(),
            steps: Vec::new(),
            diagnosis: None,
            run_meta: None,
            error_detail: String::new(),
        }
    }

    /// Append an event, truncating the head of the log at `cap` (spec §3
    /// invariant, §4.1 `push_event`). `cap` is the live `max_event_log`
    /// from `SessionsConfig` (`MAX_EVENT_LOG` is only the default).
    /// Callers are expected to hold whatever external lock protects this
    /// session before calling.
    pub fn append_event(&mut self, event: Event, cap: usize) {
        self.event_log.push(event);
        if self.event_log.len() > cap {
            let overflow = self.event_log.len() - cap;
            self.event_log.drain(0..overflow);
        }
        self.updated_at = Utc::now();
    }

    /// A lightweight summary for `GET /sessions` list views.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            scenario: self.scenario.clone(),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            turn_count: self.turn_count,
            diagnosis: self.diagnosis.clone(),
        }
    }
}

/// The projection returned by `list_all` (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub scenario: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub turn_count: u32,
    pub diagnosis: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn new_session_starts_pending_with_empty_log() {
        let s = Session::new("s1".into(), "scn".into(), "alert text".into());
        assert_eq!(s.status, SessionStatus::Pending);
        assert_eq!(s.turn_count, 0);
        assert!(s.event_log.is_empty());
        assert_eq!(s.error_detail, "");
    }

    #[test]
    fn append_event_truncates_head_at_cap() {
        let mut s = Session::new("s1".into(), "scn".into(), "alert".into());
        for i in 0..(MAX_EVENT_LOG + 10) {
            s.append_event(
                Event::new(EventKind::Heartbeat, 0, serde_json::json!({ "i": i })),
                MAX_EVENT_LOG,
            );
        }
        assert_eq!(s.event_log.len(), MAX_EVENT_LOG);
        // The oldest surviving event should be #10 (0..9 were dropped).
        assert_eq!(s.event_log[0].data["i"], 10);
    }

    #[test]
    fn status_is_active_and_is_terminal_partition_correctly() {
        assert!(SessionStatus::Pending.is_active());
        assert!(SessionStatus::InProgress.is_active());
        assert!(!SessionStatus::Completed.is_active());

        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(!SessionStatus::Pending.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
    }
}
