//! Loader configuration
//!
//! TOML-based configuration with sensible defaults. A minimal config needs
//! only the store URL; everything else has a workable default.
//!
//! # Example
//!
//! ```toml
//! [filequeue]
//! dir = "/var/lib/kaijs/queue"
//!
//! [store]
//! backend = "search"
//! url = "https://search.example.com:9200"
//!
//! [bulk]
//! max_entries = 100
//! idle = "3s"
//! ```

mod error;
mod sections;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use error::{ConfigError, Result};
pub use sections::{
    BulkSection, FileQueueSection, GlobalSection, IndexSection, KojiSection, LogSection,
    SchemasSection, StoreBackend, StoreSection,
};

/// Main configuration structure
///
/// All sections are optional with defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Process-wide settings
    pub global: GlobalSection,

    /// Logging configuration
    pub log: LogSection,

    /// File queue location and polling
    pub filequeue: FileQueueSection,

    /// Document store connection and collections
    pub store: StoreSection,

    /// Schema snapshot directory and refresh cadence
    pub schemas: SchemasSection,

    /// Bulk loader thresholds
    pub bulk: BulkSection,

    /// Koji hub endpoints
    pub koji: KojiSection,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
