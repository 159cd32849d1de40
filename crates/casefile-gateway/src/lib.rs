//! axum HTTP/SSE surface (spec §6.1/§6.2), `AppState`, CLI (`serve`,
//! `doctor`), tracing init, config loading — the binary-facing crate that
//! wires `casefile-domain`/`casefile-store`/`casefile-sessions`/
//! `casefile-bridge` into a running gateway.

pub mod api;
pub mod cli;
pub mod runtime_http;
pub mod state;

pub use state::AppState;
