//! Declarative schema model
//!
//! A schema document names the required dotted paths and the expected type
//! per path. This covers the checks the loader depends on (identity fields
//! present, timestamps are strings); the authoritative JSON-schema documents
//! live with the external schema service.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ValidationError, Violation};

/// Expected JSON type at a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }
}

/// One message schema: required paths plus per-path type expectations
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub required: Vec<String>,

    #[serde(default)]
    pub types: BTreeMap<String, FieldType>,
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = value;
    for seg in path.split('.') {
        cur = cur.as_object()?.get(seg)?;
    }
    Some(cur)
}

impl Schema {
    /// Check a body against this schema.
    pub fn validate(&self, name: &str, body: &Value) -> Result<(), ValidationError> {
        let mut violations = Vec::new();

        for path in &self.required {
            match lookup(body, path) {
                None | Some(Value::Null) => violations.push(Violation {
                    path: path.clone(),
                    message: "required field is missing".to_string(),
                }),
                Some(_) => {}
            }
        }

        for (path, expected) in &self.types {
            if let Some(value) = lookup(body, path) {
                if !expected.matches(value) {
                    violations.push(Violation {
                        path: path.clone(),
                        message: format!("expected {}", expected.name()),
                    });
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                schema: name.to_string(),
                violations,
            })
        }
    }
}
