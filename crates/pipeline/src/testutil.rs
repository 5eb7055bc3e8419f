//! Shared fixtures for pipeline tests

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use kaijs_protocol::FileQueueMessage;
use kaijs_store::MemoryStore;

use crate::handlers::HandlerContext;
use crate::koji::{BuildInfo, KojiError, KojiHub, KojiHubs};

/// Hub stub returning a canned build, or failing on demand
pub struct MockHub {
    pub fail: bool,
}

#[async_trait]
impl KojiHub for MockHub {
    async fn get_build(&self, build_id: u64) -> Result<BuildInfo, KojiError> {
        if self.fail {
            return Err(KojiError::Status {
                build_id,
                status: reqwest::StatusCode::BAD_GATEWAY,
            });
        }
        Ok(serde_json::from_value(json!({
            "task_id": 42,
            "build_id": build_id,
            "nvr": "gcompris-qt-1.1-1.fc33",
            "name": "gcompris-qt",
            "extra": {"source": {"original_url": "git+https://src.fedoraproject.org/rpms/gcompris-qt"}},
        }))
        .expect("canned build decodes"))
    }
}

pub fn hubs(fail: bool) -> KojiHubs {
    KojiHubs::new(Arc::new(MockHub { fail }), Arc::new(MockHub { fail }))
}

pub fn context(store: Arc<MemoryStore>, fail_hub: bool) -> HandlerContext {
    HandlerContext {
        store,
        hubs: hubs(fail_hub),
    }
}

pub fn envelope(n: u32, topic: &str, body: Value) -> FileQueueMessage {
    FileQueueMessage {
        fq_msg_id: format!("0001640995200-{:05}", n),
        broker_msg_id: format!("msg-{}", n),
        broker_topic: topic.into(),
        body,
        broker_extra: json!({}),
        provider_name: "umb".into(),
        provider_timestamp: 1_640_995_200,
    }
}

/// The tag event of the first-tag scenario.
pub fn tag_envelope(n: u32) -> FileQueueMessage {
    envelope(
        n,
        "org.fedoraproject.prod.buildsys.tag",
        json!({"build_id": 1728223, "owner": "musuruan", "tag": "f33-updates-candidate"}),
    )
}

/// The test-queued event of the second scenario.
pub fn queued_envelope(n: u32) -> FileQueueMessage {
    envelope(
        n,
        "org.centos.prod.ci.koji-build.test.queued",
        json!({
            "version": "0.2.1",
            "artifact": {"type": "koji-build", "id": 42},
            "pipeline": {"id": "PIPE-1"},
            "generated_at": "2022-01-01T00:00:00Z",
            "test": {"namespace": "x", "type": "y", "category": "z"},
        }),
    )
}

/// The later test-complete event on the same pipeline.
pub fn complete_envelope(n: u32) -> FileQueueMessage {
    envelope(
        n,
        "org.centos.prod.ci.koji-build.test.complete",
        json!({
            "version": "0.2.1",
            "artifact": {"type": "koji-build", "id": 42},
            "pipeline": {"id": "PIPE-1"},
            "generated_at": "2022-01-01T01:00:00Z",
            "test": {"namespace": "x", "type": "y", "category": "z"},
        }),
    )
}
