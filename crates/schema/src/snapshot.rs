//! Process-wide schema snapshot
//!
//! Readers grab the current snapshot once per envelope; the refresher swaps
//! in replacements atomically. Snapshots are immutable after construction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::json;

use crate::error::{SchemaError, ValidationError};
use crate::validate::Schema;

/// Immutable schema-name → schema map
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    schemas: HashMap<String, Schema>,
}

impl SchemaSnapshot {
    pub fn new(schemas: HashMap<String, Schema>) -> Self {
        Self { schemas }
    }

    /// Baked-in schemas for the known topics; used until the first refresh
    /// lands and as the fallback when no schema directory is configured.
    ///
    /// Schema names are family-qualified (`koji-build.test.complete`)
    /// because the families disagree on identity: RPM builds carry a
    /// numeric `artifact.id`, modules an `artifact.nsvc`, container images
    /// a string id.
    pub fn builtin() -> Self {
        let common_types = json!({
            "generated_at": "string",
            "version": "string",
            "artifact.type": "string",
            "test": "object",
        });

        let rpm_event: Schema = serde_json::from_value(json!({
            "required": ["artifact.type", "artifact.id", "generated_at"],
            "types": common_types.clone(),
        }))
        .expect("builtin schema is well-formed");

        // Module identity is the nsvc; some producers send only an id, so
        // neither field alone is required and the projection reports the
        // precise gap.
        let module_event: Schema = serde_json::from_value(json!({
            "required": ["artifact.type", "generated_at"],
            "types": {
                "generated_at": "string",
                "version": "string",
                "artifact.type": "string",
                "artifact.nsvc": "string",
                "test": "object",
            },
        }))
        .expect("builtin schema is well-formed");

        let container_event: Schema = serde_json::from_value(json!({
            "required": ["artifact.type", "artifact.id", "generated_at"],
            "types": common_types,
        }))
        .expect("builtin schema is well-formed");

        let tag_event: Schema = serde_json::from_value(json!({
            "required": ["build_id", "owner"],
            "types": {"owner": "string"},
        }))
        .expect("builtin schema is well-formed");

        let mut schemas = HashMap::new();
        for state in ["queued", "running", "complete", "error"] {
            for family in ["koji-build", "koji-build-cs", "brew-build"] {
                schemas.insert(format!("{}.test.{}", family, state), rpm_event.clone());
            }
            schemas.insert(
                format!("redhat-module.test.{}", state),
                module_event.clone(),
            );
            schemas.insert(
                format!("redhat-container-image.test.{}", state),
                container_event.clone(),
            );
        }
        schemas.insert("buildsys.tag".to_string(), tag_event);
        Self { schemas }
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Validate a body against the named schema.
    ///
    /// An unknown schema name is a validation failure, not a pass: a topic
    /// we route but cannot check is sidelined rather than trusted.
    pub fn validate(&self, name: &str, body: &serde_json::Value) -> Result<(), ValidationError> {
        match self.schemas.get(name) {
            Some(schema) => schema.validate(name, body),
            None => Err(ValidationError::unknown_schema(name)),
        }
    }
}

/// Shared handle to the current snapshot
pub struct SchemaStore {
    current: ArcSwap<SchemaSnapshot>,
}

impl SchemaStore {
    pub fn new(initial: SchemaSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Load the snapshot for one envelope's worth of validation.
    pub fn load(&self) -> Arc<SchemaSnapshot> {
        self.current.load_full()
    }

    /// Atomically replace the snapshot.
    pub fn install(&self, snapshot: SchemaSnapshot) {
        let count = snapshot.len();
        self.current.store(Arc::new(snapshot));
        tracing::info!(schemas = count, "schema snapshot installed");
    }
}

/// Read every `*.json` file in a directory into a snapshot; the file stem is
/// the schema name (`test.complete.json` → `test.complete`).
pub fn load_snapshot_dir(dir: &Path) -> Result<SchemaSnapshot, SchemaError> {
    let mut schemas = HashMap::new();
    let entries = std::fs::read_dir(dir).map_err(|e| SchemaError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| SchemaError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let raw = std::fs::read(&path).map_err(|e| SchemaError::Io {
            path: path.clone(),
            source: e,
        })?;
        let schema: Schema = serde_json::from_slice(&raw).map_err(|e| SchemaError::Parse {
            path: path.clone(),
            source: e,
        })?;
        schemas.insert(name.to_string(), schema);
    }

    Ok(SchemaSnapshot::new(schemas))
}
