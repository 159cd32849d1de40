//! `GET /sessions/{id}/stream` (spec §4.5, §6.1, §6.2).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use casefile_domain::event::{Event, EventKind};
use casefile_sessions::LiveSession;
use futures_util::stream::Stream;
use serde::Deserialize;

use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub since: usize,
}

/// Grace interval to drain any events still in flight across the
/// callback/worker boundary once the terminal `done` event has been
/// observed (spec §4.5).
const DRAIN_GRACE: Duration = Duration::from_millis(50);

pub async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<StreamQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (history, rx, sub_id, live) = state
        .sessions
        .stream(&id, q.since)
        .ok_or_else(|| ApiError(casefile_domain::Error::NotFound(id.clone())))?;

    let heartbeat = Duration::from_secs(state.config.stream.heartbeat_secs);
    let stream = make_stream(history, rx, sub_id, live, heartbeat);

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Unsubscribes on drop so a client disconnect (detected by the stream
/// future simply being dropped, never polled again) still releases the
/// subscriber slot, not just a clean exit through the end of the
/// generator (spec §4.5 "the endpoint must then unsubscribe").
struct UnsubscribeGuard {
    live: Arc<LiveSession>,
    sub_id: u64,
}

impl Drop for UnsubscribeGuard {
    fn drop(&mut self) {
        self.live.unsubscribe(self.sub_id);
    }
}

fn make_stream(
    history: Vec<Event>,
    mut rx: tokio::sync::mpsc::Receiver<Event>,
    sub_id: u64,
    live: Arc<LiveSession>,
    heartbeat: Duration,
) -> impl Stream<Item = Result<SseEvent, std::convert::Infallible>> {
    async_stream::stream! {
        let _guard = UnsubscribeGuard { live, sub_id };

        for event in history {
            yield Ok(to_sse(&event));
        }

        loop {
            match tokio::time::timeout(heartbeat, rx.recv()).await {
                Ok(Some(event)) => {
                    let is_done = event.event == EventKind::Done;
                    yield Ok(to_sse(&event));
                    if is_done {
                        // Drain anything already queued behind it before
                        // closing — a short grace window, not a retry.
                        tokio::time::sleep(DRAIN_GRACE).await;
                        while let Ok(trailing) = rx.try_recv() {
                            yield Ok(to_sse(&trailing));
                        }
                        break;
                    }
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    yield Ok(SseEvent::default().event("heartbeat").data("{}"));
                }
            }
        }
    }
}

fn to_sse(event: &Event) -> SseEvent {
    let data = serde_json::to_string(&event.data).unwrap_or_else(|_| "{}".into());
    SseEvent::default().event(event.event.as_str()).data(data)
}
