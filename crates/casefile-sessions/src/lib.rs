//! Session runtime: the in-memory half of a session (spec §2, §3, §4.1,
//! §4.4). `casefile-domain::Session` is the persisted shape; `LiveSession`
//! here wraps it with the subscriber registry, cancellation token, and
//! idle-finalizer handle that only make sense while a session is running
//! in this process, and `SessionManager` owns the active/recent lifecycle
//! across all sessions.

pub mod cancel;
pub mod live;
pub mod manager;
pub mod recent;
pub mod runner;

pub use cancel::CancelToken;
pub use live::{LiveSession, SUBSCRIBER_CAPACITY};
pub use manager::SessionManager;
pub use recent::RecentRing;
pub use runner::TurnRunner;
