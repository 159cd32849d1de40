//! Translates callbacks from an external agent-execution runtime into
//! the session event log (spec §2, §4.2). `casefile-sessions` owns the
//! session lifecycle; this crate is the one thing that knows how to
//! drive a turn to completion against that external collaborator.

pub mod bridge;
pub mod runtime;
pub mod visualization;

pub use bridge::AgentBridge;
pub use runtime::{ActionExecution, AgentRuntime, RuntimeCallback, RuntimeRun};
pub use visualization::parse_subagent_output;
