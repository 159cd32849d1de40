/// Shared error type used across all casefile crates.
///
/// Variants track the error taxonomy in spec §4.6 by *kind*, not by type
/// name, so the gateway can map a kind to an HTTP status without matching
/// on a message string.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("admission limit reached: {0}")]
    Admission(String),

    #[error("agent failure ({kind:?}): {message}")]
    AgentFailure {
        kind: AgentFailureKind,
        message: String,
    },

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Subclassification of an `AgentFailure`, per spec §4.2's retry policy:
/// `Transient` failures are retried once, `Capacity` failures (429/503/
/// circuit-breaker) are not, to avoid amplifying load on an already
/// saturated upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentFailureKind {
    Transient,
    Capacity,
}

impl Error {
    pub fn agent_transient(message: impl Into<String>) -> Self {
        Self::AgentFailure {
            kind: AgentFailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn agent_capacity(message: impl Into<String>) -> Self {
        Self::AgentFailure {
            kind: AgentFailureKind::Capacity,
            message: message.into(),
        }
    }

    /// Classify a raw error message the way the bridge must: capacity/
    /// rate-limit signals (429, 503, explicit circuit-breaker wording)
    /// are `Capacity`; everything else is `Transient`.
    pub fn classify_agent_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_capacity_error(&message) {
            Self::agent_capacity(message)
        } else {
            Self::agent_transient(message)
        }
    }
}

/// Detect capacity/rate-limit errors by the text the runtime reports.
/// The runtime is opaque (spec §1) — it does not expose a typed error
/// code, so this is a best-effort text match, not a parser.
pub fn is_capacity_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("429")
        || lower.contains("503")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("circuit breaker")
        || lower.contains("circuit_breaker")
        || lower.contains("too many requests")
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_429_as_capacity() {
        let e = Error::classify_agent_failure("upstream returned 429");
        assert!(matches!(
            e,
            Error::AgentFailure {
                kind: AgentFailureKind::Capacity,
                ..
            }
        ));
    }

    #[test]
    fn classifies_503_as_capacity() {
        let e = Error::classify_agent_failure("HTTP 503 Service Unavailable");
        assert!(matches!(
            e,
            Error::AgentFailure {
                kind: AgentFailureKind::Capacity,
                ..
            }
        ));
    }

    #[test]
    fn classifies_circuit_breaker_text_as_capacity() {
        let e = Error::classify_agent_failure("circuit breaker open for provider x");
        assert!(matches!(
            e,
            Error::AgentFailure {
                kind: AgentFailureKind::Capacity,
                ..
            }
        ));
    }

    #[test]
    fn classifies_other_errors_as_transient() {
        let e = Error::classify_agent_failure("connection reset by peer");
        assert!(matches!(
            e,
            Error::AgentFailure {
                kind: AgentFailureKind::Transient,
                ..
            }
        ));
    }
}
