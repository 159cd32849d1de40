//! Configuration (spec §6.4), loaded from an optional TOML file and
//! overlaid with the documented environment variables.
//!
//! Mirrors the reference gateway's config module: `#[serde(default = "d_...")]`
//! helpers, a hand-written `Default` impl, and a `validate()` pass that
//! never panics — bad input becomes a `ConfigIssue` the caller can log and
//! decide whether to treat as fatal.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Overlay the environment variables enumerated in spec §6.4 onto an
    /// already-loaded (or default) config. Unset variables leave the
    /// existing value (file value, or default) untouched. Malformed
    /// numeric values are recorded as a `Warning` issue and ignored.
    pub fn apply_env(&mut self, issues: &mut Vec<ConfigIssue>) {
        apply_env_usize(
            "MAX_ACTIVE_SESSIONS",
            &mut self.sessions.max_active,
            issues,
        );
        apply_env_usize(
            "MAX_RECENT_SESSIONS",
            &mut self.sessions.max_recent,
            issues,
        );
        apply_env_usize(
            "MAX_EVENT_LOG_SIZE",
            &mut self.sessions.max_event_log,
            issues,
        );
        apply_env_u64(
            "IDLE_TIMEOUT_SECONDS",
            &mut self.sessions.idle_timeout_secs,
            issues,
        );
        apply_env_usize("AGENT_MAX_ATTEMPTS", &mut self.bridge.max_attempts, issues);
        apply_env_u64(
            "HEARTBEAT_INTERVAL_SECONDS",
            &mut self.stream.heartbeat_secs,
            issues,
        );
        if let Ok(v) = std::env::var("DOCUMENT_STORE_ENDPOINT") {
            self.store.endpoint = Some(v);
        }
    }

    /// Validate the fully-resolved config. Returns issues; callers decide
    /// severity policy (the gateway refuses to start only on `Error`).
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.sessions.max_active == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "sessions.max_active must be at least 1".into(),
            });
        }
        if self.sessions.max_event_log == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "sessions.max_event_log must be at least 1".into(),
            });
        }
        if self.bridge.max_attempts == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "bridge.max_attempts is 0 — every turn will fail without attempting \
                          the agent runtime"
                    .into(),
            });
        }
        issues
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "d_max_active")]
    pub max_active: usize,
    #[serde(default = "d_max_recent")]
    pub max_recent: usize,
    #[serde(default = "d_max_event_log")]
    pub max_event_log: usize,
    #[serde(default = "d_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_active: d_max_active(),
            max_recent: d_max_recent(),
            max_event_log: d_max_event_log(),
            idle_timeout_secs: d_idle_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "d_max_attempts")]
    pub max_attempts: usize,
    /// Base URL of the external agent-execution service. Not part of the
    /// enumerated spec env vars (the runtime is an external collaborator,
    /// out of scope) but the gateway binary needs somewhere to point its
    /// HTTP adapter; `None` falls back to a localhost dev endpoint.
    #[serde(default)]
    pub runtime_endpoint: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_attempts: d_max_attempts(),
            runtime_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "d_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: d_heartbeat_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// `DOCUMENT_STORE_ENDPOINT`. `None` means the dev-mode JSON-file
    /// store is used (see `casefile-store`).
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn d_port() -> u16 {
    8080
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_max_active() -> usize {
    8
}
fn d_max_recent() -> usize {
    100
}
fn d_max_event_log() -> usize {
    500
}
fn d_idle_timeout_secs() -> u64 {
    600
}
fn d_max_attempts() -> usize {
    2
}
fn d_heartbeat_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn apply_env_usize(var: &str, field: &mut usize, issues: &mut Vec<ConfigIssue>) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<usize>() {
            Ok(v) => *field = v,
            Err(_) => issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: format!("{var}={raw:?} is not a valid integer; ignoring"),
            }),
        }
    }
}

fn apply_env_u64(var: &str, field: &mut u64, issues: &mut Vec<ConfigIssue>) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<u64>() {
            Ok(v) => *field = v,
            Err(_) => issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: format!("{var}={raw:?} is not a valid integer; ignoring"),
            }),
        }
    }
}
