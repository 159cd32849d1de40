//! The document-store interface (spec §1, §4.3, §6.3) and a JSON-file-backed
//! implementation for local development and tests.
//!
//! The real store lives behind `DOCUMENT_STORE_ENDPOINT` and is out of scope
//! (spec §1 — an external collaborator, interface only). What's here is the
//! trait the rest of the system codes against, plus a drop-in local
//! implementation so the gateway runs without one configured.

pub mod document;
pub mod json_file;
pub mod persistence;

pub use document::{DocumentStore, SessionDocument};
pub use json_file::JsonFileStore;
pub use persistence::PersistenceWorker;
