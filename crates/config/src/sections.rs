//! Configuration sections
//!
//! Each section mirrors one component's tunables and carries its defaults.

use std::time::Duration;

use serde::Deserialize;

/// Process-wide settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalSection {
    /// Grace period for component shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for GlobalSection {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Default filter directive (overridden by `--log-level`)
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// File queue location and polling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileQueueSection {
    /// Root directory of the queue; shared with the broker listener
    pub dir: String,

    /// Fallback poll interval when another process is the writer
    #[serde(with = "humantime_serde")]
    pub poll: Duration,

    /// Claim entries with a single-pass oldest-name scan
    pub optimize_list: bool,
}

impl Default for FileQueueSection {
    fn default() -> Self {
        Self {
            dir: "/var/lib/kaijs/filequeue".into(),
            poll: Duration::from_millis(250),
            optimize_list: false,
        }
    }
}

/// Which store implementation backs the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-memory store; local runs and tests
    Memory,
    /// HTTP search-index store
    Search,
}

/// Declared secondary index
#[derive(Debug, Clone, Deserialize)]
pub struct IndexSection {
    pub name: String,
    pub field: String,
    #[serde(default)]
    pub unique: bool,
}

/// Document store connection and collections
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: StoreBackend,

    /// Base URL of the search backend
    pub url: String,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Primary artifact collection
    pub artifacts: String,

    /// Sideline collection for schema-invalid messages
    pub invalid: String,

    /// Sideline collection for unroutable messages
    pub unknown: String,

    /// Child-document collection used by the bulk path
    pub artifact_states: String,

    /// Declared indexes for the artifact collection; undeclared indexes are
    /// dropped at startup, the primary is always kept
    pub indexes: Vec<IndexSection>,

    /// Per-request timeout for the search backend
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: String::new(),
            username: None,
            password: None,
            artifacts: "artifacts".into(),
            invalid: "invalid".into(),
            unknown: "no_handler".into(),
            artifact_states: "artifact_states".into(),
            indexes: vec![
                IndexSection {
                    name: "by_aid".into(),
                    field: "aid".into(),
                    unique: false,
                },
                IndexSection {
                    name: "by_type_aid".into(),
                    field: "type,aid".into(),
                    unique: true,
                },
            ],
            timeout: Duration::from_secs(30),
        }
    }
}

/// Schema snapshot directory and refresh cadence
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchemasSection {
    /// Directory the external fetcher writes schema documents into;
    /// empty means builtin schemas only
    pub dir: String,

    /// Snapshot reload interval
    #[serde(with = "humantime_serde")]
    pub refresh: Duration,
}

impl Default for SchemasSection {
    fn default() -> Self {
        Self {
            dir: String::new(),
            refresh: Duration::from_secs(12 * 60 * 60),
        }
    }
}

/// Bulk loader thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BulkSection {
    /// Use the bulk path instead of the per-envelope CAS path
    pub enabled: bool,

    /// Flush when the batch reaches this many operations
    pub max_entries: usize,

    /// Flush when accumulated documents exceed this many bytes
    pub max_bytes: usize,

    /// Flush when the queue is idle for this long
    #[serde(with = "humantime_serde")]
    pub idle: Duration,
}

impl Default for BulkSection {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: 100,
            max_bytes: 8 * 1024 * 1024,
            idle: Duration::from_secs(3),
        }
    }
}

/// Koji hub endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KojiSection {
    /// Hub for koji-build artifacts
    pub fedora_url: String,

    /// Hub for koji-build-cs artifacts
    pub centos_url: String,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for KojiSection {
    fn default() -> Self {
        Self {
            fedora_url: "https://koji.fedoraproject.org/kojihub".into(),
            centos_url: "https://kojihub.stream.centos.org/kojihub".into(),
            timeout: Duration::from_secs(30),
        }
    }
}
