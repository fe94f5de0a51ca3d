use std::future::Future;

use async_trait::async_trait;
use neo4rs::{query, Graph, Node, Query};
use serde_json::Value;

use poflow_core::config::AppConfig;
use poflow_core::error::{PoflowError, Result};
use poflow_core::store::{document_lookup_keys, Document, DocumentStore, Filter, GuardedWrite, VersionGuard};
use poflow_core::version::{document_version, latest_by};

use crate::new_document_id;

/// Timeout for all Neo4j operations (seconds).
const NEO4J_TIMEOUT_SECS: u64 = 5;

/// Documents live as `(:Document {collection, id, revision, seq, body,
/// lookup_keys})` nodes. `body` is the JSON text; `lookup_keys` holds the
/// `path=value` keys filters are narrowed by.
pub struct Neo4jDocumentStore {
    graph: Option<Graph>,
}

impl Neo4jDocumentStore {
    pub async fn new(config: &AppConfig) -> Self {
        match Graph::new(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password).await {
            Ok(graph) => {
                tracing::info!(uri = %config.neo4j_uri, "Connected to Neo4j");
                Self { graph: Some(graph) }
            }
            Err(e) => {
                tracing::warn!(uri = %config.neo4j_uri, error = %e, "Failed to connect to Neo4j, running in degraded mode");
                Self { graph: None }
            }
        }
    }

    fn graph(&self) -> Result<&Graph> {
        self.graph
            .as_ref()
            .ok_or_else(|| PoflowError::Store("Neo4j not connected".into()))
    }

    pub fn is_connected(&self) -> bool {
        self.graph.is_some()
    }

    /// Create the lookup indexes. Safe to run on every start.
    pub async fn ensure_schema(&self) -> Result<()> {
        let graph = self.graph()?;
        for cypher in [
            "CREATE INDEX document_collection_id IF NOT EXISTS FOR (d:Document) ON (d.collection, d.id)",
            "CREATE INDEX lineage_key IF NOT EXISTS FOR (l:Lineage) ON (l.collection, l.po_number)",
        ] {
            timed(graph.run(query(cypher)))
                .await?
                .map_err(|e| PoflowError::Store(format!("Failed to create index: {e}")))?;
        }
        Ok(())
    }
}

/// Wrap any async operation with a timeout, converting timeout to PoflowError::Store.
async fn timed<T, F: Future<Output = T>>(op: F) -> std::result::Result<T, PoflowError> {
    tokio::time::timeout(std::time::Duration::from_secs(NEO4J_TIMEOUT_SECS), op)
        .await
        .map_err(|_| {
            tracing::warn!("Neo4j operation timed out after {}s", NEO4J_TIMEOUT_SECS);
            PoflowError::Store(format!("Neo4j operation timed out after {}s", NEO4J_TIMEOUT_SECS))
        })
}

fn node_to_document(node: &Node) -> Result<Document> {
    let id: String = node
        .get("id")
        .map_err(|e| PoflowError::Store(format!("Missing id on document node: {e}")))?;
    let revision: i64 = node.get("revision").unwrap_or(0);
    let body_json: String = node
        .get("body")
        .map_err(|e| PoflowError::Store(format!("Missing body on document {id}: {e}")))?;
    let body: Value = serde_json::from_str(&body_json)?;

    Ok(Document {
        id,
        revision: revision.max(0) as u64,
        body,
    })
}

fn find_query(collection: &str, filter: &Filter) -> Query {
    query(
        "MATCH (d:Document {collection: $collection}) \
         WHERE all(k IN $keys WHERE k IN d.lookup_keys) \
         RETURN d ORDER BY d.seq",
    )
    .param("collection", collection.to_string())
    .param("keys", filter.lookup_keys())
}

fn create_query(collection: &str, id: &str, body: &Value) -> Result<Query> {
    let body_json = serde_json::to_string(body)?;
    Ok(query(
        "CREATE (d:Document {collection: $collection, id: $id, revision: 0, \
         seq: $seq, body: $body, lookup_keys: $keys})",
    )
    .param("collection", collection.to_string())
    .param("id", id.to_string())
    .param("seq", chrono::Utc::now().timestamp_micros())
    .param("body", body_json)
    .param("keys", document_lookup_keys(body)))
}

#[async_trait]
impl DocumentStore for Neo4jDocumentStore {
    async fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        let mut stream = timed(self.graph()?.execute(find_query(collection, filter)))
            .await?
            .map_err(|e| PoflowError::Store(format!("Failed to query {collection}: {e}")))?;

        let mut documents = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| PoflowError::Store(format!("Failed to read {collection}: {e}")))?
        {
            let node: Node = row
                .get("d")
                .map_err(|e| PoflowError::Store(format!("Failed to deserialize node: {e}")))?;
            match node_to_document(&node) {
                Ok(doc) if filter.matches(&doc.body) => documents.push(doc),
                Ok(_) => {}
                Err(e) => tracing::warn!(collection, error = %e, "Skipping malformed document node"),
            }
        }

        tracing::debug!(collection, results = documents.len(), "Document query completed");
        Ok(documents)
    }

    async fn insert_one(&self, collection: &str, body: Value) -> Result<String> {
        let id = new_document_id();
        timed(self.graph()?.run(create_query(collection, &id, &body)?))
            .await?
            .map_err(|e| PoflowError::Store(format!("Failed to insert into {collection}: {e}")))?;

        tracing::debug!(collection, id = %id, "Inserted document");
        Ok(id)
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<bool> {
        let q = query(
            "MATCH (d:Document {collection: $collection, id: $id}) \
             DETACH DELETE d RETURN count(*) AS deleted",
        )
        .param("collection", collection.to_string())
        .param("id", id.to_string());

        let mut stream = timed(self.graph()?.execute(q))
            .await?
            .map_err(|e| PoflowError::Store(format!("Failed to delete {id}: {e}")))?;

        match stream.next().await {
            Ok(Some(row)) => {
                let deleted: i64 = row.get("deleted").unwrap_or(0);
                Ok(deleted > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(PoflowError::Store(format!("Error deleting {id}: {e}"))),
        }
    }

    async fn write_guarded(
        &self,
        collection: &str,
        guard: &VersionGuard,
        writes: Vec<GuardedWrite>,
    ) -> Result<Vec<String>> {
        let mut txn = timed(self.graph()?.start_txn())
            .await?
            .map_err(|e| PoflowError::Store(format!("Failed to start transaction: {e}")))?;

        // Writing the lineage node takes its lock until commit, serializing
        // guarded writers for the same PO.
        let lock = query(
            "MERGE (l:Lineage {collection: $collection, po_number: $po_number}) \
             SET l.writes = coalesce(l.writes, 0) + 1",
        )
        .param("collection", collection.to_string())
        .param("po_number", guard.po_number.clone());
        txn.run(lock)
            .await
            .map_err(|e| PoflowError::Store(format!("Failed to lock lineage {}: {e}", guard.po_number)))?;

        let mut lineage = Vec::new();
        let mut stream = txn
            .execute(find_query(collection, &guard.lineage))
            .await
            .map_err(|e| PoflowError::Store(format!("Failed to read lineage: {e}")))?;
        while let Some(row) = stream
            .next(txn.handle())
            .await
            .map_err(|e| PoflowError::Store(format!("Failed to read lineage row: {e}")))?
        {
            let node: Node = row
                .get("d")
                .map_err(|e| PoflowError::Store(format!("Failed to deserialize lineage node: {e}")))?;
            let doc = node_to_document(&node)?;
            if guard.lineage.matches(&doc.body) {
                lineage.push(doc);
            }
        }

        let found = latest_by(&lineage, |d| document_version(&d.body))
            .map_or(String::new(), |d| document_version(&d.body).to_string());
        if lineage.is_empty() || found != guard.expected_latest {
            txn.rollback()
                .await
                .map_err(|e| PoflowError::Store(format!("Failed to roll back: {e}")))?;
            return Err(PoflowError::VersionConflict {
                po_number: guard.po_number.clone(),
                expected: guard.expected_latest.clone(),
                found,
            });
        }

        let mut ids = Vec::with_capacity(writes.len());
        for write in writes {
            let body = match write {
                GuardedWrite::Insert { body } => body,
                GuardedWrite::Replace { id, revision, body } => {
                    let delete = query(
                        "MATCH (d:Document {collection: $collection, id: $id, revision: $revision}) \
                         DETACH DELETE d RETURN count(*) AS deleted",
                    )
                    .param("collection", collection.to_string())
                    .param("id", id.clone())
                    .param("revision", revision as i64);
                    let mut deleted_stream = txn
                        .execute(delete)
                        .await
                        .map_err(|e| PoflowError::Store(format!("Failed to delete {id}: {e}")))?;
                    let deleted: i64 = deleted_stream
                        .next(txn.handle())
                        .await
                        .map_err(|e| PoflowError::Store(format!("Failed to delete {id}: {e}")))?
                        .map_or(0, |row| row.get("deleted").unwrap_or(0));
                    if deleted == 0 {
                        txn.rollback()
                            .await
                            .map_err(|e| PoflowError::Store(format!("Failed to roll back: {e}")))?;
                        return Err(PoflowError::VersionConflict {
                            po_number: guard.po_number.clone(),
                            expected: format!("{id}@{revision}"),
                            found: "changed or deleted".into(),
                        });
                    }
                    body
                }
            };
            let id = new_document_id();
            txn.run(create_query(collection, &id, &body)?)
                .await
                .map_err(|e| PoflowError::Store(format!("Failed to insert {id}: {e}")))?;
            ids.push(id);
        }

        txn.commit()
            .await
            .map_err(|e| PoflowError::Store(format!("Failed to commit transaction: {e}")))?;

        tracing::info!(
            collection,
            po_number = %guard.po_number,
            written = ids.len(),
            "Committed guarded write"
        );
        Ok(ids)
    }
}
