//! Schema and validation error types

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// One failing path within a body
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path into the body
    pub path: String,
    /// What the schema expected there
    pub message: String,
}

/// Structured validator rejection, recorded verbatim in the invalid store
#[derive(Debug, Clone, Serialize, Error)]
#[error("body failed schema '{schema}' at {} path(s)", .violations.len())]
pub struct ValidationError {
    pub schema: String,
    pub violations: Vec<Violation>,
}

impl ValidationError {
    pub fn unknown_schema(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            violations: vec![Violation {
                path: String::new(),
                message: format!("no schema named '{}' in the current snapshot", name),
            }],
            schema: name,
        }
    }
}

/// Errors from loading schema documents
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema file '{path}' is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
