use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use poflow_core::error::{PoflowError, Result};
use poflow_core::store::{Document, DocumentStore, Filter, GuardedWrite, VersionGuard};
use poflow_core::version::{document_version, latest_by};

use crate::new_document_id;

/// Process-local store. Collections keep insertion order; every mutation
/// happens under one write lock, which makes `write_guarded` atomic.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

fn check_guard(docs: &[Document], guard: &VersionGuard, writes: &[GuardedWrite]) -> Result<()> {
    let lineage: Vec<&Document> = docs.iter().filter(|d| guard.lineage.matches(&d.body)).collect();
    let found = latest_by(&lineage, |d| document_version(&d.body)).map_or("", |d| document_version(&d.body));

    if lineage.is_empty() || found != guard.expected_latest {
        return Err(PoflowError::VersionConflict {
            po_number: guard.po_number.clone(),
            expected: guard.expected_latest.clone(),
            found: found.to_string(),
        });
    }

    for write in writes {
        if let GuardedWrite::Replace { id, revision, .. } = write {
            let current = docs.iter().find(|d| &d.id == id);
            if current.map(|d| d.revision) != Some(*revision) {
                return Err(PoflowError::VersionConflict {
                    po_number: guard.po_number.clone(),
                    expected: format!("{id}@{revision}"),
                    found: current.map_or_else(|| "deleted".to_string(), |d| format!("{}@{}", d.id, d.revision)),
                });
            }
        }
    }

    Ok(())
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(&d.body)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_one(&self, collection: &str, body: Value) -> Result<String> {
        let id = new_document_id();
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.clone(),
                revision: 0,
                body,
            });
        tracing::debug!(collection, id = %id, "Inserted document");
        Ok(id)
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<bool> {
        let mut guard = self.collections.write().await;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|d| d.id != id);
        Ok(docs.len() < before)
    }

    async fn write_guarded(
        &self,
        collection: &str,
        guard: &VersionGuard,
        writes: Vec<GuardedWrite>,
    ) -> Result<Vec<String>> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        check_guard(docs, guard, &writes)?;

        let mut ids = Vec::with_capacity(writes.len());
        for write in writes {
            let body = match write {
                GuardedWrite::Insert { body } => body,
                GuardedWrite::Replace { id, body, .. } => {
                    docs.retain(|d| d.id != id);
                    body
                }
            };
            let id = new_document_id();
            docs.push(Document {
                id: id.clone(),
                revision: 0,
                body,
            });
            ids.push(id);
        }

        tracing::debug!(
            collection,
            po_number = %guard.po_number,
            written = ids.len(),
            "Applied guarded write"
        );
        Ok(ids)
    }
}
