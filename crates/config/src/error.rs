//! Configuration error types

use std::io;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors from loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required field is missing for the selected backend
    #[error("[{section}] is missing required field '{field}'")]
    MissingField {
        section: &'static str,
        field: &'static str,
    },

    /// A field holds an unusable value
    #[error("[{section}] has invalid {field}: {message}")]
    InvalidValue {
        section: &'static str,
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    pub fn missing_field(section: &'static str, field: &'static str) -> Self {
        Self::MissingField { section, field }
    }

    pub fn invalid_value(
        section: &'static str,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            section,
            field,
            message: message.into(),
        }
    }
}
