//! The document store contract
//!
//! Adapters persist artifact documents addressed by `(type, aid)` and two
//! TTL-bounded sideline collections. The CAS primitive is the concurrency
//! story: a conditional write keyed on the document's current `_version`
//! either lands exactly once or reports a miss.

use async_trait::async_trait;
use serde_json::Value;

use kaijs_protocol::{ArtifactModel, ArtifactType, UpdateSet};

use crate::error::StoreError;

/// Declared secondary index for a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name; `_id_` is implicit and never reconciled away
    pub name: String,
    /// Dotted document field the index covers
    pub field: String,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, field: impl Into<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            unique,
        }
    }
}

/// One operation in a bulk write
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOp {
    /// Target collection
    pub collection: String,
    /// Document id
    pub id: String,
    /// Full document to upsert
    pub doc: Value,
}

impl BulkOp {
    /// Serialized size, used against the bulk byte budget.
    pub fn body_bytes(&self) -> usize {
        serde_json::to_vec(&self.doc).map(|v| v.len()).unwrap_or(0)
    }
}

/// Document store abstraction shared by all backends
#[async_trait]
pub trait DocStore: Send + Sync {
    /// Ensure the collection exists and its secondary indexes match the
    /// declared set: missing ones are created, undeclared ones (except the
    /// primary) are dropped.
    async fn open_collection(
        &self,
        name: &str,
        indexes: &[IndexSpec],
    ) -> Result<(), StoreError>;

    /// Fetch the document for `(type, aid)`, if any.
    async fn get(
        &self,
        artifact_type: ArtifactType,
        aid: &str,
    ) -> Result<Option<ArtifactModel>, StoreError>;

    /// Fetch the document for the proposal's `(type, aid)`, creating it
    /// from the proposal when absent.
    ///
    /// Returns the stored document and whether it was created. A created
    /// document is the proposal itself at `_version == 1`; creation is not
    /// a mutating write and does not bump the version.
    async fn find_or_create(
        &self,
        proposal: &ArtifactModel,
    ) -> Result<(ArtifactModel, bool), StoreError>;

    /// Conditional update: apply `update_set` and bump `_version` only if
    /// the stored version still equals `expected_version`.
    ///
    /// Returns whether exactly one existing document was modified.
    async fn cas_update(
        &self,
        id: &str,
        expected_version: u64,
        update_set: &UpdateSet,
    ) -> Result<bool, StoreError>;

    /// Insert a sideline document as-is (caller sets `expire_at`).
    async fn insert_sideline(&self, collection: &str, doc: Value) -> Result<(), StoreError>;

    /// Apply a batch of upserts, atomic per operation.
    ///
    /// Any rejected operation fails the whole call with `BulkRejected`.
    async fn bulk_upsert(&self, ops: &[BulkOp]) -> Result<(), StoreError>;

    /// Release connections.
    async fn close(&self) -> Result<(), StoreError>;
}
