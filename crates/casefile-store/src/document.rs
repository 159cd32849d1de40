use async_trait::async_trait;
use casefile_domain::session::SessionStatus;
use casefile_domain::{Result, Session};
use serde::{Deserialize, Serialize};

/// The on-disk/on-wire shape of a session document (spec §6.3): the
/// persisted `Session` plus the `_docType` discriminator required so a
/// shared container can co-house other document types without queries
/// leaking across them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    #[serde(rename = "_docType")]
    pub doc_type: String,
    #[serde(flatten)]
    pub session: Session,
}

impl SessionDocument {
    pub const DOC_TYPE: &'static str = "session";

    pub fn new(session: Session) -> Self {
        Self {
            doc_type: Self::DOC_TYPE.to_owned(),
            session,
        }
    }
}

/// CRUD-by-id-and-partition-key interface the persistence worker and
/// recovery pass code against (spec §1, §4.3). `scenario` is the
/// partition key (spec §6.3).
///
/// Implementations must be idempotent for `upsert` (spec §4.3) and must
/// never leak documents of another `_docType` through `list`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str, partition_key: &str) -> Result<Option<SessionDocument>>;
    async fn upsert(&self, doc: SessionDocument) -> Result<()>;
    async fn delete(&self, id: &str, partition_key: &str) -> Result<()>;

    /// List session documents, optionally filtered by status. Always
    /// filters on `_docType = "session"` (spec §6.3, §9 discriminator
    /// note) regardless of what else lives in the container.
    async fn list(&self, status: Option<SessionStatus>) -> Result<Vec<SessionDocument>>;
}
