//! Per-event state records
//!
//! `KaiState` is the canonical record derived from one broker message;
//! `ArtifactState` wraps it with the raw body and is appended to the
//! artifact's history.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::envelope::FileQueueMessage;
use crate::json::get_str;
use crate::topic::TopicPath;
use crate::ProtocolError;

/// On-wire `origin.creator` for every state this loader produces
pub const LOADER_CREATOR: &str = "kaijs-loader";

/// Provenance of a state record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateOrigin {
    pub creator: String,
    pub reason: String,
}

impl Default for StateOrigin {
    fn default() -> Self {
        Self {
            creator: LOADER_CREATOR.to_string(),
            reason: "broker message".to_string(),
        }
    }
}

/// Canonical per-event record derived from one broker message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KaiState {
    /// CI pipeline execution this event belongs to
    pub thread_id: String,

    /// Broker message identifier; de-duplication key in `states`
    pub msg_id: String,

    /// Schema version string from the body
    pub version: String,

    /// Second-to-last topic segment
    pub stage: String,

    /// Last topic segment
    pub state: String,

    /// Milliseconds since epoch, from `generated_at`
    pub timestamp: i64,

    pub origin: StateOrigin,

    /// `"{namespace}.{type}.{category}"` when the body names all three
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_case_name: Option<String>,
}

/// One history entry in an artifact document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactState {
    pub broker_msg_body: Value,
    pub kai_state: KaiState,
}

/// Derive the thread id for a body.
///
/// `pipeline.id` wins when it is a non-empty string; otherwise the thread is
/// keyed off a hash of `run.url` so that events from the same run without a
/// pipeline id still land in one thread.
fn derive_thread_id(body: &Value) -> Result<String, ProtocolError> {
    if let Some(id) = get_str(body, "pipeline.id") {
        return Ok(id.to_string());
    }
    if let Some(url) = get_str(body, "run.url") {
        let digest = Sha256::digest(url.as_bytes());
        return Ok(format!("dummy-thread-{:x}", digest));
    }
    Err(ProtocolError::NoThreadId)
}

fn derive_test_case_name(body: &Value) -> Option<String> {
    let namespace = get_str(body, "test.namespace")?;
    let ty = get_str(body, "test.type")?;
    let category = get_str(body, "test.category")?;
    Some(format!("{}.{}.{}", namespace, ty, category))
}

fn parse_generated_at(body: &Value) -> Result<i64, ProtocolError> {
    let raw = get_str(body, "generated_at")
        .ok_or_else(|| ProtocolError::BadTimestamp("generated_at missing".to_string()))?;
    let parsed = chrono::DateTime::parse_from_rfc3339(raw)
        .map_err(|e| ProtocolError::BadTimestamp(format!("{}: {}", raw, e)))?;
    Ok(parsed.timestamp_millis())
}

/// Synthesize the `ArtifactState` for an envelope.
///
/// Fails with `NoThreadId` when the body carries neither `pipeline.id` nor
/// `run.url`, and with `BadTimestamp` when `generated_at` is absent or not
/// RFC 3339. Both failures sideline the envelope.
pub fn make_state(envelope: &FileQueueMessage) -> Result<ArtifactState, ProtocolError> {
    let topic = TopicPath::parse(&envelope.broker_topic)?;
    let body = &envelope.body;

    let kai_state = KaiState {
        thread_id: derive_thread_id(body)?,
        msg_id: envelope.broker_msg_id.clone(),
        version: get_str(body, "version").unwrap_or_default().to_string(),
        stage: topic.stage,
        state: topic.state,
        timestamp: parse_generated_at(body)?,
        origin: StateOrigin::default(),
        test_case_name: derive_test_case_name(body),
    };

    Ok(ArtifactState {
        broker_msg_body: body.clone(),
        kai_state,
    })
}

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;
