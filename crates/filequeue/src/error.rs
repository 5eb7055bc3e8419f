//! File queue error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from file queue operations
#[derive(Debug, Error)]
pub enum FileQueueError {
    /// Filesystem operation failed
    #[error("queue I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Envelope could not be serialized for push
    #[error("failed to encode envelope {fq_msg_id}: {source}")]
    Encode {
        fq_msg_id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FileQueueError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
