//! Broker message schema validation
//!
//! Schemas are fetched and refreshed by an external collaborator on a long
//! cadence; this crate holds the process-wide snapshot and answers
//! `validate(value, schema_name)`. The snapshot is an immutable value behind
//! an atomic pointer, so every envelope sees one consistent schema set while
//! the refresher swaps in new ones without locking readers.

mod error;
mod refresh;
mod snapshot;
mod validate;

pub use error::{SchemaError, ValidationError, Violation};
pub use refresh::spawn_refresher;
pub use snapshot::{load_snapshot_dir, SchemaSnapshot, SchemaStore};
pub use validate::{FieldType, Schema};
