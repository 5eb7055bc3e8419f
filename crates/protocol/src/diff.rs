//! Update-set computation for the CAS write path
//!
//! Before a conditional write, the updater diffs the proposed document
//! against the persisted one and sends only the changed leaf paths. Arrays
//! are written whole; a path that is empty in the proposal is dropped unless
//! it clears a previously populated value (a bucket that emptied out must
//! still be written, or the derived indices drift from the history).

use std::collections::BTreeMap;

use serde_json::Value;

/// Dotted leaf path → new value, applied as a single conditional update
pub type UpdateSet = BTreeMap<String, Value>;

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn diff_into(prefix: &str, proposal: &Value, persisted: Option<&Value>, out: &mut UpdateSet) {
    if let Some(p) = persisted {
        if p == proposal {
            return;
        }
    }
    match proposal {
        Value::Object(map) => {
            // Recurse only object-into-object; anything else is a leaf.
            if let Some(Value::Object(old)) = persisted {
                for (key, value) in map {
                    diff_into(&join(prefix, key), value, old.get(key), out);
                }
                return;
            }
            if is_empty(proposal) && persisted.map_or(true, is_empty) {
                return;
            }
            out.insert(prefix.to_string(), proposal.clone());
        }
        _ => {
            if is_empty(proposal) && persisted.map_or(true, is_empty) {
                return;
            }
            out.insert(prefix.to_string(), proposal.clone());
        }
    }
}

/// Compute the minimal set of leaf paths to write.
///
/// Identity and version fields never appear in the set; the CAS layer owns
/// `_version`.
pub fn diff_update_set(proposal: &Value, persisted: &Value) -> UpdateSet {
    let mut out = UpdateSet::new();
    if let (Value::Object(new), Value::Object(old)) = (proposal, persisted) {
        for (key, value) in new {
            if key == "_id" || key == "_version" || key == "type" || key == "aid" {
                continue;
            }
            diff_into(key, value, old.get(key), &mut out);
        }
    }
    out
}

#[cfg(test)]
#[path = "diff_test.rs"]
mod diff_test;
