//! Store error types
//!
//! The updater's retry policy hinges on the transient/fatal split:
//! `is_transient` errors are retried inside the envelope's CAS loop, fatal
//! ones abort the process so the supervisor restarts it.

use thiserror::Error;

/// Errors from document store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Request failed in a way that may succeed on retry
    #[error("transient store error: {0}")]
    Transient(String),

    /// Connection, authentication, or protocol failure
    #[error("fatal store error: {0}")]
    Fatal(String),

    /// Document exists but does not decode as an artifact
    #[error("document '{id}' failed to decode: {source}")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// Bulk write rejected one or more operations
    #[error("bulk upsert failed: {0}")]
    BulkRejected(String),
}

impl StoreError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Whether the CAS loop may retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        // Timeouts and connection resets are worth retrying; anything that
        // got a definitive response classifies by status elsewhere.
        if e.is_timeout() || e.is_connect() {
            Self::Transient(e.to_string())
        } else {
            Self::Fatal(e.to_string())
        }
    }
}
