//! Tests for update-set computation

use serde_json::json;

use crate::diff::diff_update_set;

#[test]
fn identical_documents_produce_empty_set() {
    let doc = json!({
        "type": "koji-build",
        "aid": "42",
        "_version": 3,
        "rpm_build": {"task_id": 42, "nvr": "gcompris-qt-1.1-1.fc33"},
    });
    assert!(diff_update_set(&doc, &doc).is_empty());
}

#[test]
fn changed_scalars_become_leaf_paths() {
    let persisted = json!({"rpm_build": {"task_id": 42, "issuer": "old"}});
    let proposal = json!({"rpm_build": {"task_id": 42, "issuer": "musuruan"}});
    let set = diff_update_set(&proposal, &persisted);
    assert_eq!(set.len(), 1);
    assert_eq!(set["rpm_build.issuer"], json!("musuruan"));
}

#[test]
fn new_nested_field_is_written() {
    let persisted = json!({"rpm_build": {"task_id": 42}});
    let proposal = json!({"rpm_build": {"task_id": 42, "nvr": "a-1-1"}});
    let set = diff_update_set(&proposal, &persisted);
    assert_eq!(set["rpm_build.nvr"], json!("a-1-1"));
}

#[test]
fn arrays_are_written_whole() {
    let persisted = json!({"states": [{"kai_state": {"msg_id": "m1"}}]});
    let proposal = json!({
        "states": [{"kai_state": {"msg_id": "m1"}}, {"kai_state": {"msg_id": "m2"}}],
    });
    let set = diff_update_set(&proposal, &persisted);
    assert_eq!(set.len(), 1);
    assert_eq!(set["states"].as_array().unwrap().len(), 2);
}

#[test]
fn empty_values_with_no_prior_data_are_dropped() {
    let persisted = json!({});
    let proposal = json!({
        "resultsdb_testcase": [],
        "current_state": {},
        "note": null,
    });
    assert!(diff_update_set(&proposal, &persisted).is_empty());
}

#[test]
fn emptied_bucket_still_writes() {
    // A thread moved queued→complete: the queued bucket must be cleared in
    // the persisted document, not silently kept.
    let persisted = json!({
        "current_state": {"queued": [{"kai_state": {"msg_id": "m1"}}]},
        "current_state_lenghts": {"queued": 1},
    });
    let proposal = json!({
        "current_state": {"queued": [], "complete": [{"kai_state": {"msg_id": "m2"}}]},
        "current_state_lenghts": {"queued": 0, "complete": 1},
    });
    let set = diff_update_set(&proposal, &persisted);
    assert_eq!(set["current_state.queued"], json!([]));
    assert_eq!(set["current_state.complete"].as_array().unwrap().len(), 1);
    assert_eq!(set["current_state_lenghts.queued"], json!(0));
    assert_eq!(set["current_state_lenghts.complete"], json!(1));
}

#[test]
fn identity_and_version_fields_are_excluded() {
    let persisted = json!({"type": "koji-build", "aid": "42", "_version": 1});
    let proposal = json!({"type": "koji-build", "aid": "42", "_version": 9});
    assert!(diff_update_set(&proposal, &persisted).is_empty());
}

#[test]
fn object_replacing_scalar_is_a_leaf_write() {
    let persisted = json!({"extra": "unset"});
    let proposal = json!({"extra": {"source": {"original_url": "git+https://x"}}});
    let set = diff_update_set(&proposal, &persisted);
    assert_eq!(set["extra"]["source"]["original_url"], json!("git+https://x"));
}
