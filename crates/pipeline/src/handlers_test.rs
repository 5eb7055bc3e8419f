//! Tests for the per-topic projections

use std::sync::Arc;

use serde_json::json;

use kaijs_protocol::ArtifactType;
use kaijs_routing::HandlerKind;
use kaijs_store::{DocStore, MemoryStore};

use crate::handlers::{project, ProjectionFailure};
use crate::testutil::{context, envelope, queued_envelope, tag_envelope};

#[tokio::test]
async fn first_tag_event_builds_rpm_record() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(store.clone(), false);

    let model = project(HandlerKind::BuildTag, &ctx, &tag_envelope(0))
        .await
        .unwrap();

    assert_eq!(model.artifact_type, ArtifactType::KojiBuild);
    assert_eq!(model.aid, "42");
    assert_eq!(model.version, 1);
    assert!(model.states.is_empty());

    let rpm = model.rpm_build.as_ref().expect("rpm_build payload");
    assert_eq!(rpm.task_id, Some(42));
    assert_eq!(rpm.build_id, Some(1728223));
    assert_eq!(rpm.nvr.as_deref(), Some("gcompris-qt-1.1-1.fc33"));
    assert_eq!(rpm.issuer.as_deref(), Some("musuruan"));
    assert_eq!(rpm.component.as_deref(), Some("gcompris-qt"));
    assert_eq!(
        rpm.source.as_deref(),
        Some("git+https://src.fedoraproject.org/rpms/gcompris-qt")
    );
    assert_eq!(rpm.scratch, Some(false));

    // Creation seeded the full proposal at version 1.
    let stored = store
        .get(ArtifactType::KojiBuild, "42")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.version, 1);
    assert!(stored.rpm_build.is_some());
}

#[tokio::test]
async fn centos_tag_event_targets_the_cs_family() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(store, false);

    let env = envelope(
        0,
        "org.centos.prod.buildsys.tag",
        json!({"build_id": 99, "owner": "someone"}),
    );
    let model = project(HandlerKind::BuildTag, &ctx, &env).await.unwrap();
    assert_eq!(model.artifact_type, ArtifactType::KojiBuildCs);
}

#[tokio::test]
async fn hub_failure_is_an_external_error() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(store, true);

    let err = project(HandlerKind::BuildTag, &ctx, &tag_envelope(0))
        .await
        .unwrap_err();
    assert!(matches!(err, ProjectionFailure::External(_)));
}

#[tokio::test]
async fn tag_event_without_build_id_is_invalid() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(store, false);

    let env = envelope(
        0,
        "org.fedoraproject.prod.buildsys.tag",
        json!({"owner": "someone"}),
    );
    let err = project(HandlerKind::BuildTag, &ctx, &env).await.unwrap_err();
    assert!(matches!(err, ProjectionFailure::Invalid { .. }));
}

#[tokio::test]
async fn queued_event_appends_state() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(store, false);

    let model = project(HandlerKind::KojiBuildTest, &ctx, &queued_envelope(1))
        .await
        .unwrap();

    assert_eq!(model.aid, "42");
    assert_eq!(model.states.len(), 1);
    let kai = &model.states[0].kai_state;
    assert_eq!(kai.thread_id, "PIPE-1");
    assert_eq!(kai.stage, "test");
    assert_eq!(kai.state, "queued");
    assert_eq!(kai.timestamp, 1_640_995_200_000);
    assert_eq!(kai.test_case_name.as_deref(), Some("x.y.z"));
    assert_eq!(model.current_state["queued"].len(), 1);
    assert_eq!(model.current_state_lengths["queued"], 1);
}

#[tokio::test]
async fn missing_thread_sources_is_invalid() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(store, false);

    let env = envelope(
        0,
        "org.centos.prod.ci.koji-build.test.queued",
        json!({
            "artifact": {"type": "koji-build", "id": 42},
            "generated_at": "2022-01-01T00:00:00Z",
        }),
    );
    let err = project(HandlerKind::KojiBuildTest, &ctx, &env)
        .await
        .unwrap_err();
    let ProjectionFailure::Invalid { path, .. } = err else {
        panic!("expected invalid failure");
    };
    assert_eq!(path, "pipeline.id");
}

#[tokio::test]
async fn module_identity_is_the_nsvc() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(store, false);

    let env = envelope(
        0,
        "org.centos.prod.ci.redhat-module.test.complete",
        json!({
            "artifact": {
                "type": "redhat-module",
                "nsvc": "nodejs:16:820220301:abcdef12",
                "name": "nodejs",
                "stream": "16",
            },
            "pipeline": {"id": "MOD-1"},
            "generated_at": "2022-03-01T00:00:00Z",
        }),
    );
    let model = project(HandlerKind::ModuleTest, &ctx, &env).await.unwrap();

    assert_eq!(model.artifact_type, ArtifactType::RedHatModule);
    assert_eq!(model.aid, "nodejs:16:820220301:abcdef12");
    assert_eq!(model.states.len(), 1);
    let module = model.module_build.as_ref().expect("module_build payload");
    assert_eq!(module.name.as_deref(), Some("nodejs"));
    assert_eq!(module.nsvc.as_deref(), Some("nodejs:16:820220301:abcdef12"));
}

#[tokio::test]
async fn container_event_carries_full_names_whole() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(store, false);

    let env = envelope(
        0,
        "org.centos.prod.ci.redhat-container-image.test.running",
        json!({
            "artifact": {
                "type": "redhat-container-image",
                "id": "sha256:abc",
                "nvr": "ubi9-container-9.0-1",
                "full_names": ["registry.example.com/ubi9:9.0-1"],
            },
            "run": {"url": "https://jenkins.example.com/job/7"},
            "generated_at": "2022-05-01T00:00:00Z",
        }),
    );
    let model = project(HandlerKind::ContainerImageTest, &ctx, &env)
        .await
        .unwrap();

    assert_eq!(model.aid, "sha256:abc");
    let image = model
        .container_image
        .as_ref()
        .expect("container_image payload");
    assert_eq!(image.full_names, vec!["registry.example.com/ubi9:9.0-1"]);
    assert!(model.states[0]
        .kai_state
        .thread_id
        .starts_with("dummy-thread-"));
}

#[tokio::test]
async fn duplicate_msg_id_does_not_grow_history() {
    let store = Arc::new(MemoryStore::new());
    let ctx = context(store.clone(), false);

    let first = project(HandlerKind::KojiBuildTest, &ctx, &queued_envelope(1))
        .await
        .unwrap();
    assert_eq!(first.states.len(), 1);

    // Persist the first projection so the re-delivery sees it.
    let doc = serde_json::to_value(&first).unwrap();
    store
        .bulk_upsert(&[kaijs_store::BulkOp {
            collection: "artifacts".into(),
            id: first.doc_id(),
            doc,
        }])
        .await
        .unwrap();

    let again = project(HandlerKind::KojiBuildTest, &ctx, &queued_envelope(1))
        .await
        .unwrap();
    assert_eq!(again.states.len(), 1);
}
