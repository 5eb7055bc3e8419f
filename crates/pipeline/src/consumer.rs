//! Stream consumer loop
//!
//! Pops one envelope at a time and drives it through the updater. No
//! envelope advances until the previous one committed or rolled back; the
//! transactional pop is the only synchronization between loader processes
//! sharing a queue.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use kaijs_filequeue::FileQueue;

use crate::error::PipelineError;
use crate::metrics::LoaderMetrics;
use crate::updater::{Outcome, Updater};

/// Redelivery backoff after an external query failure
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Sequential consumer over a file queue
pub struct Loader {
    queue: FileQueue,
    updater: Updater,
    metrics: Arc<LoaderMetrics>,
}

impl Loader {
    pub fn new(queue: FileQueue, updater: Updater) -> Self {
        let metrics = Arc::clone(updater.metrics());
        Self {
            queue,
            updater,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<LoaderMetrics> {
        &self.metrics
    }

    /// Run until the queue stops or a fatal error occurs.
    ///
    /// Cancelling the token stops the queue watcher; the in-flight envelope
    /// finishes its retry loop before the method returns.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), PipelineError> {
        let queue_stopper = {
            let queue = self.queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                queue.stop();
            })
        };

        let result = self.consume().await;
        queue_stopper.abort();
        result
    }

    async fn consume(&self) -> Result<(), PipelineError> {
        while let Some(popped) = self.queue.tpop().await? {
            let envelope = popped.message();
            tracing::debug!(
                fq_msg_id = %envelope.fq_msg_id,
                topic = %envelope.broker_topic,
                "processing envelope"
            );

            match self.updater.process(envelope).await {
                Ok(outcome) => {
                    match &outcome {
                        Outcome::Updated(model) => {
                            self.metrics.updated.fetch_add(1, Ordering::Relaxed);
                            tracing::info!(
                                artifact = %model.doc_id(),
                                version = model.version,
                                topic = %envelope.broker_topic,
                                "artifact updated"
                            );
                        }
                        Outcome::Unchanged(_) => {
                            self.metrics.unchanged.fetch_add(1, Ordering::Relaxed);
                        }
                        Outcome::Invalid | Outcome::UnknownTopic => {}
                    }
                    popped.commit()?;
                    self.metrics.processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        fq_msg_id = %popped.message().fq_msg_id,
                        error = %e,
                        "deferring envelope for redelivery"
                    );
                    popped.rollback()?;
                    self.metrics.rollbacks.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(e) => {
                    tracing::error!(
                        fq_msg_id = %popped.message().fq_msg_id,
                        error = %e,
                        "fatal processing error"
                    );
                    popped.rollback()?;
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "consumer_test.rs"]
mod consumer_test;
