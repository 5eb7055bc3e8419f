//! Protocol error types

use thiserror::Error;

/// Errors raised while deriving records from a broker message
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Neither `pipeline.id` nor `run.url` was a usable string
    #[error("cannot derive thread id: body has neither pipeline.id nor run.url")]
    NoThreadId,

    /// `generated_at` missing or not an RFC 3339 timestamp
    #[error("cannot parse event timestamp from generated_at: {0}")]
    BadTimestamp(String),

    /// Topic has fewer than two dot-delimited segments
    #[error("topic '{0}' has no stage.state suffix")]
    ShortTopic(String),

    /// Artifact type string not in the closed set
    #[error("unknown artifact type '{0}'")]
    UnknownArtifactType(String),
}
