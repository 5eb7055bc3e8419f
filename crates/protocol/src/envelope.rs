//! File-queue envelope
//!
//! `FileQueueMessage` is the self-contained record the broker listener
//! persists for every accepted message and the loader later consumes. It is
//! immutable once written.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One accepted broker message, as stored in the file queue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileQueueMessage {
    /// Unique, time-prefixed id assigned at push time; sorts in FIFO order
    pub fq_msg_id: String,

    /// Opaque broker message identifier
    pub broker_msg_id: String,

    /// Dotted topic, e.g. `org.centos.prod.ci.koji-build.test.complete`
    pub broker_topic: String,

    /// Decoded JSON body
    pub body: Value,

    /// Broker headers and application properties
    #[serde(default)]
    pub broker_extra: Value,

    /// Listener that produced this envelope
    pub provider_name: String,

    /// Unix seconds at receipt
    pub provider_timestamp: i64,
}

impl fmt::Display for FileQueueMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.fq_msg_id, self.broker_topic)
    }
}

/// Generator for `fq_msg_id` values: `"{unix_secs}-{seq:05}"`.
///
/// The sequence resets every second, so ids are monotonic within a single
/// writer and lexicographic order equals arrival order.
#[derive(Debug, Default)]
pub struct FqMsgIdGen {
    state: Mutex<(i64, u32)>,
}

impl FqMsgIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next id for the given wall-clock second.
    pub fn next_at(&self, unix_secs: i64) -> String {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.0 == unix_secs {
            state.1 += 1;
        } else {
            *state = (unix_secs, 0);
        }
        format!("{:010}-{:05}", unix_secs, state.1)
    }

    /// Produce the next id for the current wall clock.
    pub fn next(&self) -> String {
        self.next_at(chrono::Utc::now().timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_monotonic_within_a_second() {
        let gen = FqMsgIdGen::new();
        let a = gen.next_at(1_640_995_200);
        let b = gen.next_at(1_640_995_200);
        let c = gen.next_at(1_640_995_201);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn sequence_resets_on_new_second() {
        let gen = FqMsgIdGen::new();
        gen.next_at(100);
        gen.next_at(100);
        let id = gen.next_at(101);
        assert!(id.ends_with("-00000"));
    }

    #[test]
    fn envelope_round_trip() {
        let msg = FileQueueMessage {
            fq_msg_id: "0001640995200-00000".into(),
            broker_msg_id: "ID:umb-1234".into(),
            broker_topic: "org.centos.prod.ci.koji-build.test.queued".into(),
            body: json!({"version": "0.2.1"}),
            broker_extra: json!({"subscription": "Consumer.kaijs.queue"}),
            provider_name: "umb".into(),
            provider_timestamp: 1_640_995_200,
        };
        let text = serde_json::to_string(&msg).unwrap();
        let back: FileQueueMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
    }
}
