//! Tests for configuration loading and validation

use std::str::FromStr;
use std::time::Duration;

use crate::sections::StoreBackend;
use crate::{Config, ConfigError};

#[test]
fn empty_config_uses_defaults() {
    let config = Config::from_str("").unwrap();
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.store.artifacts, "artifacts");
    assert_eq!(config.bulk.max_entries, 100);
    assert_eq!(config.bulk.idle, Duration::from_secs(3));
    assert_eq!(config.schemas.refresh, Duration::from_secs(12 * 60 * 60));
    assert!(!config.bulk.enabled);
}

#[test]
fn full_config_parses() {
    let config = Config::from_str(
        r#"
        [global]
        shutdown_timeout = "10s"

        [log]
        level = "debug"

        [filequeue]
        dir = "/data/queue"
        poll = "500ms"

        [store]
        backend = "search"
        url = "https://search.example.com:9200"
        username = "loader"
        password = "secret"
        artifacts = "artifacts_v2"

        [[store.indexes]]
        name = "by_aid"
        field = "aid"
        unique = true

        [schemas]
        dir = "/data/schemas"
        refresh = "12h"

        [bulk]
        enabled = true
        max_entries = 250
        max_bytes = 1048576
        idle = "5s"

        [koji]
        fedora_url = "https://koji.example.com/kojihub"
        timeout = "15s"
        "#,
    )
    .unwrap();

    assert_eq!(config.global.shutdown_timeout, Duration::from_secs(10));
    assert_eq!(config.filequeue.dir, "/data/queue");
    assert_eq!(config.filequeue.poll, Duration::from_millis(500));
    assert_eq!(config.store.backend, StoreBackend::Search);
    assert_eq!(config.store.artifacts, "artifacts_v2");
    assert_eq!(config.store.indexes.len(), 1);
    assert!(config.store.indexes[0].unique);
    assert!(config.bulk.enabled);
    assert_eq!(config.bulk.max_entries, 250);
    assert_eq!(config.koji.fedora_url, "https://koji.example.com/kojihub");
    assert_eq!(config.koji.timeout, Duration::from_secs(15));
}

#[test]
fn search_backend_requires_url() {
    let err = Config::from_str("[store]\nbackend = \"search\"").unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingField {
            section: "store",
            field: "url",
        }
    ));
}

#[test]
fn search_url_must_be_http() {
    let err = Config::from_str(
        "[store]\nbackend = \"search\"\nurl = \"search.example.com:9200\"",
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { field: "url", .. }));
}

#[test]
fn zero_bulk_thresholds_are_rejected() {
    let err = Config::from_str("[bulk]\nmax_entries = 0").unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidValue {
            field: "max_entries",
            ..
        }
    ));

    let err = Config::from_str("[bulk]\nidle = \"0s\"").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { field: "idle", .. }));
}

#[test]
fn empty_queue_dir_is_rejected() {
    let err = Config::from_str("[filequeue]\ndir = \"\"").unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingField {
            section: "filequeue",
            field: "dir",
        }
    ));
}

#[test]
fn unknown_backend_fails_to_parse() {
    assert!(Config::from_str("[store]\nbackend = \"oracle\"").is_err());
}
