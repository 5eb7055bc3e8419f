//! Sideline collections
//!
//! Envelopes that cannot become artifact updates are recorded here instead
//! of looping forever: schema-invalid bodies go to the invalid collection,
//! unroutable topics to the unknown-topic collection. Records expire after
//! 15 days.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use kaijs_protocol::FileQueueMessage;
use kaijs_schema::ValidationError;

use crate::error::StoreError;
use crate::traits::DocStore;

pub const INVALID_COLLECTION: &str = "invalid";
pub const UNKNOWN_TOPIC_COLLECTION: &str = "no_handler";

const RETENTION_DAYS: i64 = 15;

/// Write-only access to the two sideline collections
pub struct SidelineStores {
    store: Arc<dyn DocStore>,
    invalid_collection: String,
    unknown_collection: String,
}

impl SidelineStores {
    pub fn new(store: Arc<dyn DocStore>) -> Self {
        Self::with_collections(store, INVALID_COLLECTION, UNKNOWN_TOPIC_COLLECTION)
    }

    pub fn with_collections(
        store: Arc<dyn DocStore>,
        invalid: impl Into<String>,
        unknown: impl Into<String>,
    ) -> Self {
        Self {
            store,
            invalid_collection: invalid.into(),
            unknown_collection: unknown.into(),
        }
    }

    /// Record a schema-invalid (or state-underivable) envelope.
    pub async fn record_invalid(
        &self,
        envelope: &FileQueueMessage,
        errmsg: &ValidationError,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let doc = json!({
            "timestamp": now.timestamp_millis(),
            "time": now.to_rfc3339(),
            "broker_msg": envelope.body,
            "broker_topic": envelope.broker_topic,
            "errmsg": errmsg,
            "expire_at": expire_at(now),
        });
        tracing::warn!(
            topic = %envelope.broker_topic,
            fq_msg_id = %envelope.fq_msg_id,
            schema = %errmsg.schema,
            violations = errmsg.violations.len(),
            "recording invalid message"
        );
        self.store.insert_sideline(&self.invalid_collection, doc).await
    }

    /// Record an envelope whose topic matched no handler.
    pub async fn record_unknown_topic(
        &self,
        envelope: &FileQueueMessage,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let doc = json!({
            "timestamp": now.timestamp_millis(),
            "time": now.to_rfc3339(),
            "broker_msg": envelope.body,
            "broker_topic": envelope.broker_topic,
            "expire_at": expire_at(now),
        });
        tracing::warn!(
            topic = %envelope.broker_topic,
            fq_msg_id = %envelope.fq_msg_id,
            "recording unroutable message"
        );
        self.store
            .insert_sideline(&self.unknown_collection, doc)
            .await
    }
}

fn expire_at(now: DateTime<Utc>) -> String {
    (now + Duration::days(RETENTION_DAYS)).to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use kaijs_schema::Violation;

    fn envelope() -> FileQueueMessage {
        FileQueueMessage {
            fq_msg_id: "0001640995200-00000".into(),
            broker_msg_id: "msg-1".into(),
            broker_topic: "org.centos.prod.ci.koji-build.test.queued".into(),
            body: json!({"bad": true}),
            broker_extra: json!({}),
            provider_name: "umb".into(),
            provider_timestamp: 1_640_995_200,
        }
    }

    #[tokio::test]
    async fn invalid_record_carries_validator_output() {
        let memory = Arc::new(MemoryStore::new());
        let sidelines = SidelineStores::new(memory.clone());

        let err = ValidationError {
            schema: "test.queued".into(),
            violations: vec![Violation {
                path: "generated_at".into(),
                message: "required field is missing".into(),
            }],
        };
        sidelines.record_invalid(&envelope(), &err).await.unwrap();

        let docs = memory.docs(INVALID_COLLECTION).await;
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc["broker_topic"], "org.centos.prod.ci.koji-build.test.queued");
        assert_eq!(doc["broker_msg"]["bad"], true);
        assert_eq!(doc["errmsg"]["schema"], "test.queued");
        assert_eq!(doc["errmsg"]["violations"][0]["path"], "generated_at");
        assert!(doc["expire_at"].is_string());
        assert!(doc["timestamp"].is_i64());
    }

    #[tokio::test]
    async fn unknown_topic_record_has_no_errmsg() {
        let memory = Arc::new(MemoryStore::new());
        let sidelines = SidelineStores::new(memory.clone());

        sidelines.record_unknown_topic(&envelope()).await.unwrap();

        let docs = memory.docs(UNKNOWN_TOPIC_COLLECTION).await;
        assert_eq!(docs.len(), 1);
        assert!(docs[0].get("errmsg").is_none());
    }

    #[test]
    fn retention_is_fifteen_days() {
        let now = Utc::now();
        let expire: DateTime<Utc> = expire_at(now).parse().unwrap();
        assert_eq!((expire - now).num_days(), 15);
    }
}
