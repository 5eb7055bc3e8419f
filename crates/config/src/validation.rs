//! Cross-field configuration validation

use crate::error::{ConfigError, Result};
use crate::sections::StoreBackend;
use crate::Config;

/// Checks that cut across sections:
/// - the search backend needs a URL
/// - thresholds must be non-zero
/// - the queue directory must be set
pub fn validate_config(config: &Config) -> Result<()> {
    if config.filequeue.dir.is_empty() {
        return Err(ConfigError::missing_field("filequeue", "dir"));
    }

    if config.store.backend == StoreBackend::Search {
        if config.store.url.is_empty() {
            return Err(ConfigError::missing_field("store", "url"));
        }
        if !config.store.url.starts_with("http://") && !config.store.url.starts_with("https://") {
            return Err(ConfigError::invalid_value(
                "store",
                "url",
                "must start with http:// or https://",
            ));
        }
    }

    if config.bulk.max_entries == 0 {
        return Err(ConfigError::invalid_value(
            "bulk",
            "max_entries",
            "must be at least 1",
        ));
    }
    if config.bulk.max_bytes == 0 {
        return Err(ConfigError::invalid_value(
            "bulk",
            "max_bytes",
            "must be at least 1",
        ));
    }
    if config.bulk.idle.is_zero() {
        return Err(ConfigError::invalid_value(
            "bulk",
            "idle",
            "must be a positive duration",
        ));
    }

    Ok(())
}
