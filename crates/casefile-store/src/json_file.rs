use std::collections::HashMap;
use std::path::{Path, PathBuf};

use casefile_domain::session::SessionStatus;
use casefile_domain::Result;
use parking_lot::RwLock;

use crate::document::{DocumentStore, SessionDocument};

/// A dev/test-only `DocumentStore` backed by a single JSON file.
///
/// Used when `DOCUMENT_STORE_ENDPOINT` is unset (spec §6.4). Keeps every
/// document in memory and rewrites the whole file on each mutation —
/// fine for the session volumes this system targets, not meant to stand
/// in for the real partitioned store.
pub struct JsonFileStore {
    path: PathBuf,
    docs: RwLock<HashMap<String, SessionDocument>>,
}

impl JsonFileStore {
    /// Load (or create) the store at `state_dir/sessions.json`.
    pub fn new(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)?;
        let path = state_dir.join("sessions.json");
        let docs = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            documents = docs.len(),
            path = %path.display(),
            "document store loaded"
        );

        Ok(Self {
            path,
            docs: RwLock::new(docs),
        })
    }

    fn flush(&self) -> Result<()> {
        let docs = self.docs.read();
        let json = serde_json::to_string_pretty(&*docs)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for JsonFileStore {
    async fn get(&self, id: &str, partition_key: &str) -> Result<Option<SessionDocument>> {
        let doc = self.docs.read().get(id).cloned();
        Ok(doc.filter(|d| d.session.scenario == partition_key))
    }

    async fn upsert(&self, doc: SessionDocument) -> Result<()> {
        self.docs
            .write()
            .insert(doc.session.id.clone(), doc);
        self.flush()
    }

    async fn delete(&self, id: &str, partition_key: &str) -> Result<()> {
        let mut docs = self.docs.write();
        if let Some(existing) = docs.get(id) {
            if existing.session.scenario != partition_key {
                return Ok(());
            }
        }
        docs.remove(id);
        drop(docs);
        self.flush()
    }

    async fn list(&self, status: Option<SessionStatus>) -> Result<Vec<SessionDocument>> {
        let docs = self.docs.read();
        let items = docs
            .values()
            .filter(|d| d.doc_type == SessionDocument::DOC_TYPE)
            .filter(|d| status.map_or(true, |s| d.session.status == s))
            .cloned()
            .collect();
        Ok(items)
    }
}
