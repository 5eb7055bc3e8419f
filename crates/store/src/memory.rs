//! In-memory document store
//!
//! Full-fidelity reference backend: tests and local runs use it, and it
//! defines the semantics the HTTP backend must match. Documents are stored
//! as raw JSON so the dotted-path update set applies exactly as it would on
//! the wire.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use kaijs_protocol::{ArtifactModel, ArtifactType, UpdateSet};

use crate::error::StoreError;
use crate::traits::{BulkOp, DocStore, IndexSpec};

/// Collection that holds artifact documents
pub const ARTIFACTS_COLLECTION: &str = "artifacts";

#[derive(Debug, Default)]
struct Collection {
    docs: BTreeMap<String, Value>,
    indexes: Vec<IndexSpec>,
}

/// Shared in-memory backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw documents of a collection, in id order. Test observability.
    pub async fn docs(&self, collection: &str) -> Vec<Value> {
        let cols = self.collections.lock().await;
        cols.get(collection)
            .map(|c| c.docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Declared indexes of a collection after reconciliation.
    pub async fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        let cols = self.collections.lock().await;
        cols.get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default()
    }
}

/// Apply one dotted path assignment, creating intermediate objects.
fn set_path(doc: &mut Value, path: &str, value: Value) {
    let mut cur = doc;
    let mut segs = path.split('.').peekable();
    while let Some(seg) = segs.next() {
        if !cur.is_object() {
            *cur = Value::Object(Default::default());
        }
        let map = cur.as_object_mut().expect("coerced to object above");
        if segs.peek().is_none() {
            map.insert(seg.to_string(), value);
            return;
        }
        cur = map.entry(seg.to_string()).or_insert(Value::Null);
    }
}

#[async_trait]
impl DocStore for MemoryStore {
    async fn open_collection(
        &self,
        name: &str,
        indexes: &[IndexSpec],
    ) -> Result<(), StoreError> {
        let mut cols = self.collections.lock().await;
        let col = cols.entry(name.to_string()).or_default();

        let before = col.indexes.len();
        col.indexes.retain(|idx| indexes.contains(idx));
        let dropped = before - col.indexes.len();
        let mut created = 0;
        for idx in indexes {
            if !col.indexes.contains(idx) {
                col.indexes.push(idx.clone());
                created += 1;
            }
        }
        tracing::debug!(
            collection = name,
            created = created,
            dropped = dropped,
            "collection opened, indexes reconciled"
        );
        Ok(())
    }

    async fn get(
        &self,
        artifact_type: ArtifactType,
        aid: &str,
    ) -> Result<Option<ArtifactModel>, StoreError> {
        let id = format!("{}/{}", artifact_type, aid);
        let cols = self.collections.lock().await;
        let Some(doc) = cols
            .get(ARTIFACTS_COLLECTION)
            .and_then(|c| c.docs.get(&id))
        else {
            return Ok(None);
        };
        let model = serde_json::from_value(doc.clone())
            .map_err(|e| StoreError::Decode { id, source: e })?;
        Ok(Some(model))
    }

    async fn find_or_create(
        &self,
        proposal: &ArtifactModel,
    ) -> Result<(ArtifactModel, bool), StoreError> {
        let id = proposal.doc_id();
        let mut cols = self.collections.lock().await;
        let col = cols.entry(ARTIFACTS_COLLECTION.to_string()).or_default();

        if let Some(doc) = col.docs.get(&id) {
            let model = serde_json::from_value(doc.clone())
                .map_err(|e| StoreError::Decode { id, source: e })?;
            return Ok((model, false));
        }

        let mut created = proposal.clone();
        created.version = 1;
        let doc = serde_json::to_value(&created)
            .map_err(|e| StoreError::fatal(format!("encode new document: {}", e)))?;
        col.docs.insert(id, doc);
        Ok((created, true))
    }

    async fn cas_update(
        &self,
        id: &str,
        expected_version: u64,
        update_set: &UpdateSet,
    ) -> Result<bool, StoreError> {
        let mut cols = self.collections.lock().await;
        let Some(col) = cols.get_mut(ARTIFACTS_COLLECTION) else {
            return Ok(false);
        };
        let Some(doc) = col.docs.get_mut(id) else {
            return Ok(false);
        };
        if doc.get("_version").and_then(Value::as_u64) != Some(expected_version) {
            return Ok(false);
        }

        for (path, value) in update_set {
            set_path(doc, path, value.clone());
        }
        set_path(doc, "_version", Value::from(expected_version + 1));
        Ok(true)
    }

    async fn insert_sideline(&self, collection: &str, doc: Value) -> Result<(), StoreError> {
        let mut cols = self.collections.lock().await;
        let col = cols.entry(collection.to_string()).or_default();
        let seq = col.docs.len();
        col.docs.insert(format!("{:012}", seq), doc);
        Ok(())
    }

    async fn bulk_upsert(&self, ops: &[BulkOp]) -> Result<(), StoreError> {
        let mut cols = self.collections.lock().await;
        for op in ops {
            let col = cols.entry(op.collection.clone()).or_default();
            col.docs.insert(op.id.clone(), op.doc.clone());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;
