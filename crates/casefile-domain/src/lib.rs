//! Shared types for the casefile session manager + SSE event bridge.
//!
//! No I/O lives here: just the data model (`Event`, `Session`), the shared
//! error taxonomy, configuration, and structured trace events. Everything
//! that touches a socket, a file, or a lock lives in `casefile-store`,
//! `casefile-sessions`, `casefile-bridge`, or `casefile-gateway`.

pub mod config;
pub mod error;
pub mod event;
pub mod session;
pub mod trace;

pub use error::{Error, Result};
pub use event::{Event, EventKind};
pub use session::{RunMeta, Session, SessionStatus, StepSummary};
