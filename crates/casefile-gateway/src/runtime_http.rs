//! Default [`AgentRuntime`] implementation: calls a configured HTTP agent-
//! execution service. The runtime itself is an external collaborator
//! (out of scope); this is only the thin adapter gluing its wire format to
//! `casefile_bridge::AgentRuntime`, in the same spirit as the reference
//! gateway's `OpenAiCompatProvider` — a `reqwest::Client` talking to a
//! configured `base_url`, with request/response shapes defined locally.

use std::sync::Arc;
use std::time::Duration;

use casefile_bridge::{ActionExecution, AgentRuntime, RuntimeCallback, RuntimeRun};
use casefile_domain::{Error, Result};
use serde::Deserialize;
use tokio::sync::mpsc;

const CALLBACK_CAPACITY: usize = 64;

pub struct HttpAgentRuntime {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAgentRuntime {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Internal(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RunResponsePayload {
    thread_id: Option<String>,
    #[serde(default)]
    steps: Vec<StepPayload>,
    message: Option<String>,
    tokens: Option<u64>,
    time: Option<f64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StepPayload {
    agent: String,
    query: Option<String>,
    reasoning: Option<String>,
    response: String,
    duration: Option<f64>,
    tool_output: Option<serde_json::Value>,
    action_name: Option<String>,
    action_data: Option<serde_json::Value>,
}

#[async_trait::async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn run(&self, prompt: &str, thread_id: Option<String>) -> Result<RuntimeRun> {
        let (tx, rx) = mpsc::channel(CALLBACK_CAPACITY);
        let client = self.client.clone();
        let url = format!("{}/runs", self.base_url);
        let body = serde_json::json!({ "prompt": prompt, "thread_id": thread_id });
        let given_thread_id = thread_id;

        tokio::spawn(async move {
            drive(client, url, body, given_thread_id, tx).await;
        });

        Ok(RuntimeRun {
            thread_id: None,
            callbacks: rx,
        })
    }

    async fn last_assistant_message(&self, thread_id: &str) -> Result<Option<String>> {
        let url = format!("{}/threads/{thread_id}/last", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::agent_transient(format!("last_assistant_message: {e}")))?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        #[derive(Deserialize)]
        struct LastMessage {
            message: Option<String>,
        }
        let parsed: LastMessage = resp
            .json()
            .await
            .map_err(|e| Error::agent_transient(format!("decoding last message: {e}")))?;
        Ok(parsed.message)
    }
}

async fn drive(
    client: reqwest::Client,
    url: String,
    body: serde_json::Value,
    given_thread_id: Option<String>,
    tx: mpsc::Sender<RuntimeCallback>,
) {
    let response = match client.post(&url).json(&body).send().await {
        Ok(r) => r,
        Err(e) => {
            let _ = tx
                .send(RuntimeCallback::Error {
                    message: format!("request to agent runtime failed: {e}"),
                })
                .await;
            return;
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let _ = tx
            .send(RuntimeCallback::Error {
                message: format!("agent runtime returned {status}: {text}"),
            })
            .await;
        return;
    }

    let payload: RunResponsePayload = match response.json().await {
        Ok(p) => p,
        Err(e) => {
            let _ = tx
                .send(RuntimeCallback::Error {
                    message: format!("decoding agent runtime response: {e}"),
                })
                .await;
            return;
        }
    };

    if let Some(message) = payload.error {
        let _ = tx.send(RuntimeCallback::Error { message }).await;
        return;
    }

    if let Some(new_thread_id) = payload.thread_id {
        if given_thread_id.as_deref() != Some(new_thread_id.as_str()) {
            let _ = tx
                .send(RuntimeCallback::ThreadCreated {
                    thread_id: new_thread_id,
                })
                .await;
        }
    }

    let step_count = payload.steps.len() as u32;
    for (i, step) in payload.steps.into_iter().enumerate() {
        let step_no = i as u32;
        if tx
            .send(RuntimeCallback::StepThinking {
                agent: step.agent.clone(),
                status: "starting".into(),
            })
            .await
            .is_err()
        {
            return;
        }
        if tx
            .send(RuntimeCallback::StepStarted {
                step: step_no,
                agent: step.agent.clone(),
                query: step.query.clone(),
                reasoning: step.reasoning.clone(),
            })
            .await
            .is_err()
        {
            return;
        }

        let tool_call_id = step.tool_output.is_some().then(|| format!("call-{step_no}"));
        if let (Some(call_id), Some(output)) = (tool_call_id.clone(), step.tool_output.clone()) {
            if tx.send(RuntimeCallback::ToolOutput { call_id, output }).await.is_err() {
                return;
            }
        }

        let action = step
            .action_name
            .map(|action_name| ActionExecution {
                action_name,
                action_data: step.action_data.unwrap_or(serde_json::Value::Null),
            });

        if tx
            .send(RuntimeCallback::StepCompleted {
                step: step_no,
                agent: step.agent,
                duration: step.duration.unwrap_or(0.0),
                query: step.query.unwrap_or_default(),
                response: step.response,
                reasoning: step.reasoning,
                tool_call_id,
                action,
            })
            .await
            .is_err()
        {
            return;
        }
    }

    if tx
        .send(RuntimeCallback::MessageDelta {
            text: payload.message.unwrap_or_default(),
        })
        .await
        .is_err()
    {
        return;
    }

    let _ = tx
        .send(RuntimeCallback::RunCompleted {
            steps: step_count,
            tokens: payload.tokens.unwrap_or(0),
            time: payload.time.unwrap_or(0.0),
        })
        .await;
}

const DEV_DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9009";

/// Wrap in an `Arc` for `AppState`. Falls back to a localhost dev endpoint
/// when `bridge.runtime_endpoint` is unset, mirroring how the reference
/// gateway degrades (warns, keeps serving) when no LLM provider is
/// configured rather than refusing to start.
pub fn build(endpoint: Option<String>) -> Result<Arc<dyn AgentRuntime>> {
    let base_url = endpoint.unwrap_or_else(|| {
        tracing::warn!(
            default = DEV_DEFAULT_ENDPOINT,
            "bridge.runtime_endpoint not set — falling back to a localhost dev endpoint"
        );
        DEV_DEFAULT_ENDPOINT.to_owned()
    });
    Ok(Arc::new(HttpAgentRuntime::new(base_url)?))
}
