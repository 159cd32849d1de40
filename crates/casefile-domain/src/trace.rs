use serde::Serialize;

/// Structured trace events emitted across the casefile crates (spec §7).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
        scenario: String,
        active_count: usize,
    },
    SessionStarted {
        session_id: String,
        turn: u32,
    },
    SessionFinalized {
        session_id: String,
        status: String,
        turn: u32,
        steps: u32,
    },
    SessionEvicted {
        session_id: String,
        reason: String,
    },
    SessionRecovered {
        session_id: String,
        previous_status: String,
    },
    PersistFailed {
        session_id: String,
        attempt: u32,
        error: String,
    },
    SubscriberOverflow {
        session_id: String,
        dropped_events: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "casefile_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let e = TraceEvent::SessionCreated {
            session_id: "s1".into(),
            scenario: "phishing".into(),
            active_count: 1,
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["event"], "SessionCreated");
        assert_eq!(json["session_id"], "s1");
    }
}
