//! Bulk loader for the indexed-store backend
//!
//! Instead of a read-merge-CAS per envelope, this path denormalizes each
//! event into store upserts: one identity/payload document per artifact and
//! one child document per CI state, keyed by `msg_id` so redelivery is
//! idempotent. Upserts accumulate and flush when the batch grows past the
//! operation or byte budget, or when the queue goes idle.
//!
//! Commit discipline: the file-queue entries behind a batch are committed
//! only after the bulk write succeeds. A rejected flush rolls every entry
//! back and the process exits non-zero so the supervisor restarts into a
//! clean redelivery.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use kaijs_filequeue::{FileQueue, PoppedMessage};
use kaijs_protocol::{make_state, FileQueueMessage, TopicPath};
use kaijs_routing::HandlerRegistry;
use kaijs_schema::{SchemaStore, ValidationError, Violation};
use kaijs_store::{BulkOp, DocStore, SidelineStores};

use crate::error::PipelineError;
use crate::handlers::{event_parts, HandlerContext, ProjectionFailure};
use crate::koji::KojiHubs;
use crate::metrics::LoaderMetrics;

/// Bulk accumulation thresholds
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Flush when the batch reaches this many operations
    pub max_entries: usize,
    /// Flush when accumulated serialized documents exceed this many bytes
    pub max_bytes: usize,
    /// Flush when no message arrives for this long
    pub idle: Duration,
    /// Collection for artifact identity documents
    pub artifacts_collection: String,
    /// Collection for per-state child documents
    pub states_collection: String,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            max_bytes: 8 * 1024 * 1024,
            idle: Duration::from_secs(3),
            artifacts_collection: "artifacts".into(),
            states_collection: "artifact_states".into(),
        }
    }
}

/// Redelivery backoff after an external query failure
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Consumer loop that drains the queue through bulk upserts
pub struct BulkLoader {
    queue: FileQueue,
    store: Arc<dyn DocStore>,
    schemas: Arc<SchemaStore>,
    registry: HandlerRegistry,
    sidelines: SidelineStores,
    ctx: HandlerContext,
    config: BulkConfig,
    metrics: Arc<LoaderMetrics>,
}

/// What one envelope contributed to the pending batch
enum Contribution {
    /// Upserts to accumulate
    Ops(Vec<BulkOp>),
    /// Sidelined; the envelope is settled and can commit immediately
    Sidelined,
}

impl BulkLoader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: FileQueue,
        store: Arc<dyn DocStore>,
        schemas: Arc<SchemaStore>,
        registry: HandlerRegistry,
        hubs: KojiHubs,
        sidelines: SidelineStores,
        config: BulkConfig,
        metrics: Arc<LoaderMetrics>,
    ) -> Self {
        let ctx = HandlerContext {
            store: Arc::clone(&store),
            hubs,
        };
        Self {
            queue,
            store,
            schemas,
            registry,
            sidelines,
            ctx,
            config,
            metrics,
        }
    }

    /// Run until the queue stops or a fatal error occurs.
    ///
    /// Cancelling the token stops the queue; whatever is accumulated is then
    /// flushed-and-committed, or rolled back if the flush fails.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), PipelineError> {
        let queue_stopper = {
            let queue = self.queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                queue.stop();
            })
        };

        let mut pending: Vec<PoppedMessage> = Vec::new();
        let mut ops: Vec<BulkOp> = Vec::new();
        let mut bytes: usize = 0;

        let result = loop {
            let popped = match tokio::time::timeout(self.config.idle, self.queue.tpop()).await {
                Ok(Ok(Some(popped))) => popped,
                Ok(Ok(None)) => break Ok(()),
                Ok(Err(e)) => break Err(PipelineError::Queue(e)),
                Err(_elapsed) => {
                    if !ops.is_empty() {
                        if let Err(e) = self.flush(&mut pending, &mut ops, &mut bytes).await {
                            break Err(e);
                        }
                    }
                    continue;
                }
            };

            match self.contribute(popped.message()).await {
                Ok(Contribution::Sidelined) => {
                    popped.commit()?;
                    self.metrics.processed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Contribution::Ops(new_ops)) => {
                    bytes += new_ops.iter().map(BulkOp::body_bytes).sum::<usize>();
                    ops.extend(new_ops);
                    pending.push(popped);

                    if ops.len() >= self.config.max_entries || bytes >= self.config.max_bytes {
                        if let Err(e) = self.flush(&mut pending, &mut ops, &mut bytes).await {
                            break Err(e);
                        }
                    }
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(error = %e, "deferring envelope for redelivery");
                    popped.rollback()?;
                    self.metrics.rollbacks.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(e) => {
                    popped.rollback()?;
                    rollback_all(&mut pending);
                    break Err(e);
                }
            }
        };

        queue_stopper.abort();

        match result {
            Ok(()) => {
                // Drained or stopped: settle the tail exactly once.
                if !ops.is_empty() {
                    self.flush(&mut pending, &mut ops, &mut bytes).await?;
                }
                Ok(())
            }
            Err(e) => {
                rollback_all(&mut pending);
                Err(e)
            }
        }
    }

    /// Turn one envelope into bulk operations, or sideline it.
    async fn contribute(
        &self,
        envelope: &FileQueueMessage,
    ) -> Result<Contribution, PipelineError> {
        let Ok(kind) = self.registry.resolve(&envelope.broker_topic) else {
            self.sidelines.record_unknown_topic(envelope).await?;
            self.metrics.unknown_topic.fetch_add(1, Ordering::Relaxed);
            return Ok(Contribution::Sidelined);
        };

        let Ok(topic) = TopicPath::parse(&envelope.broker_topic) else {
            self.sidelines.record_unknown_topic(envelope).await?;
            self.metrics.unknown_topic.fetch_add(1, Ordering::Relaxed);
            return Ok(Contribution::Sidelined);
        };
        let schema_name = topic.schema_name();
        if let Err(errmsg) = self.schemas.load().validate(&schema_name, &envelope.body) {
            self.sidelines.record_invalid(envelope, &errmsg).await?;
            self.metrics.invalid.fetch_add(1, Ordering::Relaxed);
            return Ok(Contribution::Sidelined);
        }

        let parts = match event_parts(kind, &self.ctx, envelope).await {
            Ok(parts) => parts,
            Err(ProjectionFailure::Invalid { path, message }) => {
                let errmsg = ValidationError {
                    schema: schema_name,
                    violations: vec![Violation { path, message }],
                };
                self.sidelines.record_invalid(envelope, &errmsg).await?;
                self.metrics.invalid.fetch_add(1, Ordering::Relaxed);
                return Ok(Contribution::Sidelined);
            }
            Err(ProjectionFailure::External(e)) => {
                return Err(PipelineError::ExternalQueryFailed(e));
            }
            Err(ProjectionFailure::Store(e)) => return Err(e.into()),
        };

        let doc_id = format!("{}/{}", parts.artifact_type, parts.aid);
        let mut artifact_doc = serde_json::json!({
            "type": parts.artifact_type,
            "aid": parts.aid,
        });
        if let Value::Object(payload) = serde_json::to_value(&parts.payload)
            .map_err(|e| kaijs_store::StoreError::fatal(format!("encode payload: {}", e)))?
        {
            artifact_doc
                .as_object_mut()
                .expect("artifact_doc is an object")
                .extend(payload);
        }

        let mut ops = vec![BulkOp {
            collection: self.config.artifacts_collection.clone(),
            id: doc_id.clone(),
            doc: artifact_doc,
        }];

        if parts.has_state {
            let state = match make_state(envelope) {
                Ok(state) => state,
                Err(e) => {
                    let failure = ProjectionFailure::from(e);
                    let ProjectionFailure::Invalid { path, message } = failure else {
                        unreachable!("state synthesis only fails on body problems");
                    };
                    let errmsg = ValidationError {
                        schema: topic.schema_name(),
                        violations: vec![Violation { path, message }],
                    };
                    self.sidelines.record_invalid(envelope, &errmsg).await?;
                    self.metrics.invalid.fetch_add(1, Ordering::Relaxed);
                    return Ok(Contribution::Sidelined);
                }
            };
            let mut state_doc = serde_json::to_value(&state)
                .map_err(|e| kaijs_store::StoreError::fatal(format!("encode state: {}", e)))?;
            state_doc["type"] = serde_json::to_value(parts.artifact_type)
                .map_err(|e| kaijs_store::StoreError::fatal(format!("encode type: {}", e)))?;
            state_doc["aid"] = Value::from(parts.aid.clone());
            ops.push(BulkOp {
                collection: self.config.states_collection.clone(),
                id: format!("{}#{}", doc_id, state.kai_state.msg_id),
                doc: state_doc,
            });
        }

        Ok(Contribution::Ops(ops))
    }

    /// Write the accumulated batch; commit every entry on success, roll all
    /// back on failure.
    async fn flush(
        &self,
        pending: &mut Vec<PoppedMessage>,
        ops: &mut Vec<BulkOp>,
        bytes: &mut usize,
    ) -> Result<(), PipelineError> {
        let batch = std::mem::take(ops);
        *bytes = 0;

        tracing::debug!(
            ops = batch.len(),
            envelopes = pending.len(),
            "flushing bulk batch"
        );

        match self.store.bulk_upsert(&batch).await {
            Ok(()) => {
                for popped in pending.drain(..) {
                    popped.commit()?;
                    self.metrics.processed.fetch_add(1, Ordering::Relaxed);
                    self.metrics.updated.fetch_add(1, Ordering::Relaxed);
                }
                self.metrics.bulk_flushes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, ops = batch.len(), "bulk flush rejected, rolling back batch");
                rollback_all(pending);
                Err(PipelineError::BulkFlushFailed(e))
            }
        }
    }
}

fn rollback_all(pending: &mut Vec<PoppedMessage>) {
    for popped in pending.drain(..) {
        if let Err(e) = popped.rollback() {
            tracing::warn!(error = %e, "rollback failed; entry recovers on next open");
        }
    }
}

#[cfg(test)]
#[path = "bulk_test.rs"]
mod bulk_test;
