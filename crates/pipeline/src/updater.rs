//! Optimistically-concurrent document updater
//!
//! One envelope in, one settled disposition out: either the document store
//! reflects the event (possibly as a no-op for duplicates), or the envelope
//! is recorded to a sideline collection, or a typed error tells the caller
//! to roll back or abort.
//!
//! The write path is read-merge-compare-and-swap: re-run the projection,
//! re-read the persisted document, diff to a minimal update set, and issue a
//! conditional write keyed on `(_id, _version)`. A concurrent writer makes
//! the CAS miss and the loop retries with fresh state, up to 30 attempts.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::Value;

use kaijs_protocol::{diff_update_set, ArtifactModel, FileQueueMessage, TopicPath};
use kaijs_routing::HandlerRegistry;
use kaijs_schema::{SchemaStore, ValidationError, Violation};
use kaijs_store::{DocStore, SidelineStores};

use crate::error::PipelineError;
use crate::handlers::{project, HandlerContext, ProjectionFailure};
use crate::koji::KojiHubs;
use crate::metrics::LoaderMetrics;

/// CAS attempts per envelope before giving up
pub const MAX_UPDATE_ATTEMPTS: usize = 30;

/// How an envelope settled
#[derive(Debug)]
pub enum Outcome {
    /// A conditional write landed
    Updated(ArtifactModel),
    /// The proposal matched the persisted document; nothing written
    Unchanged(ArtifactModel),
    /// Recorded to the invalid store
    Invalid,
    /// Recorded to the unknown-topic store
    UnknownTopic,
}

/// Per-envelope update driver
pub struct Updater {
    store: Arc<dyn DocStore>,
    schemas: Arc<SchemaStore>,
    registry: HandlerRegistry,
    sidelines: SidelineStores,
    ctx: HandlerContext,
    metrics: Arc<LoaderMetrics>,
}

impl Updater {
    pub fn new(
        store: Arc<dyn DocStore>,
        schemas: Arc<SchemaStore>,
        registry: HandlerRegistry,
        hubs: KojiHubs,
        sidelines: SidelineStores,
        metrics: Arc<LoaderMetrics>,
    ) -> Self {
        let ctx = HandlerContext {
            store: Arc::clone(&store),
            hubs,
        };
        Self {
            store,
            schemas,
            registry,
            sidelines,
            ctx,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<LoaderMetrics> {
        &self.metrics
    }

    /// Process one envelope to a settled disposition.
    ///
    /// `Ok` outcomes mean the envelope can be committed. `Err` means the
    /// caller decides: retryable errors roll back, the rest are fatal.
    pub async fn process(&self, envelope: &FileQueueMessage) -> Result<Outcome, PipelineError> {
        let kind = match self.registry.resolve(&envelope.broker_topic) {
            Ok(kind) => kind,
            Err(_) => {
                self.sidelines.record_unknown_topic(envelope).await?;
                self.metrics.unknown_topic.fetch_add(1, Ordering::Relaxed);
                return Ok(Outcome::UnknownTopic);
            }
        };

        // One consistent schema snapshot for the whole envelope.
        let schema_name = match TopicPath::parse(&envelope.broker_topic) {
            Ok(topic) => topic.schema_name(),
            Err(_) => {
                self.sidelines.record_unknown_topic(envelope).await?;
                self.metrics.unknown_topic.fetch_add(1, Ordering::Relaxed);
                return Ok(Outcome::UnknownTopic);
            }
        };
        if let Err(errmsg) = self.schemas.load().validate(&schema_name, &envelope.body) {
            self.sidelines.record_invalid(envelope, &errmsg).await?;
            self.metrics.invalid.fetch_add(1, Ordering::Relaxed);
            return Ok(Outcome::Invalid);
        }

        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let proposal = match project(kind, &self.ctx, envelope).await {
                Ok(model) => model,
                Err(ProjectionFailure::Invalid { path, message }) => {
                    let errmsg = ValidationError {
                        schema: schema_name.clone(),
                        violations: vec![Violation { path, message }],
                    };
                    self.sidelines.record_invalid(envelope, &errmsg).await?;
                    self.metrics.invalid.fetch_add(1, Ordering::Relaxed);
                    return Ok(Outcome::Invalid);
                }
                Err(ProjectionFailure::External(e)) => {
                    return Err(PipelineError::ExternalQueryFailed(e));
                }
                Err(ProjectionFailure::Store(e)) if e.is_transient() => {
                    tracing::warn!(
                        attempt = attempt,
                        error = %e,
                        "transient store error during projection, retrying"
                    );
                    continue;
                }
                Err(ProjectionFailure::Store(e)) => return Err(e.into()),
            };

            let Some(db_entry) = self
                .store
                .get(proposal.artifact_type, &proposal.aid)
                .await?
            else {
                // find_or_create just made it; a miss here is a read race.
                tracing::warn!(
                    artifact = %proposal.doc_id(),
                    attempt = attempt,
                    "document missing after find_or_create, retrying"
                );
                continue;
            };

            let proposal_doc = encode(&proposal)?;
            let persisted_doc = encode(&db_entry)?;
            let update_set = diff_update_set(&proposal_doc, &persisted_doc);

            if update_set.is_empty() {
                tracing::debug!(
                    artifact = %proposal.doc_id(),
                    msg_id = %envelope.broker_msg_id,
                    "no changes, skipping write"
                );
                return Ok(Outcome::Unchanged(proposal));
            }

            match self
                .store
                .cas_update(&db_entry.doc_id(), db_entry.version, &update_set)
                .await
            {
                Ok(true) => {
                    tracing::debug!(
                        artifact = %proposal.doc_id(),
                        version = db_entry.version + 1,
                        paths = update_set.len(),
                        "document updated"
                    );
                    let mut updated = proposal;
                    updated.version = db_entry.version + 1;
                    return Ok(Outcome::Updated(updated));
                }
                Ok(false) => {
                    self.metrics.cas_retries.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        artifact = %proposal.doc_id(),
                        attempt = attempt,
                        "version conflict, retrying"
                    );
                }
                Err(e) if e.is_transient() => {
                    self.metrics.cas_retries.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        artifact = %proposal.doc_id(),
                        attempt = attempt,
                        error = %e,
                        "transient store error on update, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PipelineError::UpdateExhausted {
            id: envelope.broker_msg_id.clone(),
            attempts: MAX_UPDATE_ATTEMPTS,
        })
    }
}

fn encode(model: &ArtifactModel) -> Result<Value, PipelineError> {
    serde_json::to_value(model)
        .map_err(|e| kaijs_store::StoreError::fatal(format!("encode document: {}", e)).into())
}

#[cfg(test)]
#[path = "updater_test.rs"]
mod updater_test;
