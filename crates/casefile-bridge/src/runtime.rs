//! The interface the bridge requires from the external agent runtime
//! (spec §4.2 "Interface the core requires"). The runtime itself — the
//! thing that actually runs agents — is an external collaborator and
//! out of scope; this module is only the seam.

use async_trait::async_trait;
use casefile_domain::Result;
use tokio::sync::mpsc;

/// One callback the runtime delivers while a run is in flight. Delivered
/// on "a background thread of the runtime's choosing" (spec §4.2) — in
/// this codebase that thread is modeled as whatever produces values into
/// `RuntimeRun::callbacks`.
#[derive(Debug, Clone)]
pub enum RuntimeCallback {
    ThreadCreated {
        thread_id: String,
    },
    StepThinking {
        agent: String,
        status: String,
    },
    StepStarted {
        step: u32,
        agent: String,
        query: Option<String>,
        reasoning: Option<String>,
    },
    /// Output of a synchronously-invoked tool/action call, cached by
    /// `call_id` so a later `StepCompleted` can attach it (spec §4.2
    /// "Tool/action callbacks").
    ToolOutput {
        call_id: String,
        output: serde_json::Value,
    },
    StepCompleted {
        step: u32,
        agent: String,
        duration: f64,
        query: String,
        response: String,
        reasoning: Option<String>,
        tool_call_id: Option<String>,
        action: Option<ActionExecution>,
    },
    MessageDelta {
        text: String,
    },
    RunCompleted {
        steps: u32,
        tokens: u64,
        time: f64,
    },
    Error {
        message: String,
    },
}

/// A dispatch-style tool invocation observed mid-step (spec §4.2
/// `action_executed`).
#[derive(Debug, Clone)]
pub struct ActionExecution {
    pub action_name: String,
    pub action_data: serde_json::Value,
}

/// The handle returned by `AgentRuntime::run` (spec §4.2
/// `run(prompt, thread_id?) → (handler, thread_id')`). `thread_id` is
/// populated up front only if the runtime already knows it (e.g. reusing
/// an existing thread); otherwise it arrives later as a
/// `RuntimeCallback::ThreadCreated`.
pub struct RuntimeRun {
    pub thread_id: Option<String>,
    pub callbacks: mpsc::Receiver<RuntimeCallback>,
}

/// The external agent-execution service. Implementations are expected to
/// run work on their own thread(s) and marshal callbacks onto
/// `RuntimeRun::callbacks` without blocking the caller.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn run(&self, prompt: &str, thread_id: Option<String>) -> Result<RuntimeRun>;

    /// Empty-response fallback (spec §4.2): query the runtime's message
    /// history for the most recent assistant message.
    async fn last_assistant_message(&self, thread_id: &str) -> Result<Option<String>>;
}
