//! Pipeline error types
//!
//! The variants mirror the dispositions the consumer loop takes: external
//! query failures roll the envelope back for redelivery, store and
//! exhaustion failures are fatal.

use thiserror::Error;

use kaijs_filequeue::FileQueueError;
use kaijs_store::StoreError;

use crate::koji::KojiError;

/// Errors that abort or defer envelope processing
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Koji hub lookup failed; the envelope is rolled back and redelivered
    #[error("external build-system query failed: {0}")]
    ExternalQueryFailed(#[source] KojiError),

    /// CAS loop ran out of attempts
    #[error("update for '{id}' exhausted after {attempts} attempts")]
    UpdateExhausted { id: String, attempts: usize },

    /// Store failure that retrying inside the envelope cannot fix
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Bulk flush rejected; accumulated envelopes were rolled back
    #[error("bulk flush failed: {0}")]
    BulkFlushFailed(#[source] StoreError),

    /// File queue failure
    #[error(transparent)]
    Queue(#[from] FileQueueError),
}

impl PipelineError {
    /// Whether the envelope should be rolled back for a later retry rather
    /// than killing the process.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalQueryFailed(_))
    }
}
