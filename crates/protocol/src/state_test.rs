//! Tests for state synthesis
//!
//! Covers thread-id derivation and fallback, timestamp parsing, and the
//! test-case-name rule.

use serde_json::json;

use crate::envelope::FileQueueMessage;
use crate::state::{make_state, LOADER_CREATOR};
use crate::ProtocolError;

fn envelope(topic: &str, body: serde_json::Value) -> FileQueueMessage {
    FileQueueMessage {
        fq_msg_id: "0001640995200-00000".into(),
        broker_msg_id: "msg-1".into(),
        broker_topic: topic.into(),
        body,
        broker_extra: json!({}),
        provider_name: "umb".into(),
        provider_timestamp: 1_640_995_200,
    }
}

#[test]
fn pipeline_id_wins() {
    let env = envelope(
        "org.centos.prod.ci.koji-build.test.queued",
        json!({
            "version": "0.2.1",
            "pipeline": {"id": "PIPE-1"},
            "run": {"url": "https://jenkins.example.com/job/1"},
            "generated_at": "2022-01-01T00:00:00Z",
        }),
    );
    let state = make_state(&env).unwrap();
    assert_eq!(state.kai_state.thread_id, "PIPE-1");
    assert_eq!(state.kai_state.stage, "test");
    assert_eq!(state.kai_state.state, "queued");
    assert_eq!(state.kai_state.timestamp, 1_640_995_200_000);
    assert_eq!(state.kai_state.version, "0.2.1");
    assert_eq!(state.kai_state.origin.creator, LOADER_CREATOR);
}

#[test]
fn run_url_fallback_is_deterministic() {
    let body = json!({
        "run": {"url": "https://jenkins.example.com/job/1"},
        "generated_at": "2022-01-01T00:00:00Z",
    });
    let a = make_state(&envelope("a.b.test.queued", body.clone())).unwrap();
    let b = make_state(&envelope("a.b.test.queued", body)).unwrap();
    assert_eq!(a.kai_state.thread_id, b.kai_state.thread_id);
    assert!(a.kai_state.thread_id.starts_with("dummy-thread-"));
    // sha256 hex digest after the prefix
    assert_eq!(a.kai_state.thread_id.len(), "dummy-thread-".len() + 64);
}

#[test]
fn empty_pipeline_id_falls_back_to_run_url() {
    let env = envelope(
        "a.b.test.queued",
        json!({
            "pipeline": {"id": ""},
            "run": {"url": "https://jenkins.example.com/job/2"},
            "generated_at": "2022-01-01T00:00:00Z",
        }),
    );
    let state = make_state(&env).unwrap();
    assert!(state.kai_state.thread_id.starts_with("dummy-thread-"));
}

#[test]
fn no_thread_id_is_an_error() {
    let env = envelope("a.b.test.queued", json!({"generated_at": "2022-01-01T00:00:00Z"}));
    assert!(matches!(
        make_state(&env),
        Err(ProtocolError::NoThreadId)
    ));
}

#[test]
fn missing_generated_at_is_an_error() {
    let env = envelope("a.b.test.queued", json!({"pipeline": {"id": "P"}}));
    assert!(matches!(
        make_state(&env),
        Err(ProtocolError::BadTimestamp(_))
    ));
}

#[test]
fn malformed_generated_at_is_an_error() {
    let env = envelope(
        "a.b.test.queued",
        json!({"pipeline": {"id": "P"}, "generated_at": "yesterday"}),
    );
    assert!(matches!(
        make_state(&env),
        Err(ProtocolError::BadTimestamp(_))
    ));
}

#[test]
fn test_case_name_needs_all_three_parts() {
    let full = envelope(
        "a.b.test.complete",
        json!({
            "pipeline": {"id": "P"},
            "generated_at": "2022-01-01T00:00:00Z",
            "test": {"namespace": "x", "type": "y", "category": "z"},
        }),
    );
    assert_eq!(
        make_state(&full).unwrap().kai_state.test_case_name.as_deref(),
        Some("x.y.z")
    );

    let partial = envelope(
        "a.b.test.complete",
        json!({
            "pipeline": {"id": "P"},
            "generated_at": "2022-01-01T00:00:00Z",
            "test": {"namespace": "x", "type": "y", "category": ""},
        }),
    );
    assert_eq!(make_state(&partial).unwrap().kai_state.test_case_name, None);
}
