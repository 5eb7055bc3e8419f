//! Koji hub client
//!
//! Build-tag events name a build id, not the task id the artifact is keyed
//! on; resolving one to the other takes a side query against the hub that
//! owns the artifact family. The hub is an injected capability so tests and
//! the updater never know whether it is HTTP or a mock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use kaijs_protocol::ArtifactType;
use thiserror::Error;

/// Hub response for one build
#[derive(Debug, Clone, Deserialize)]
pub struct BuildInfo {
    pub task_id: u64,
    #[serde(default)]
    pub build_id: Option<u64>,
    pub nvr: String,
    /// Package (component) name
    pub name: String,
    #[serde(default)]
    pub extra: Option<BuildExtra>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildExtra {
    #[serde(default)]
    pub source: Option<BuildSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildSource {
    #[serde(default)]
    pub original_url: Option<String>,
}

impl BuildInfo {
    /// The dist-git URL the build came from, when the hub knows it.
    pub fn source_url(&self) -> Option<&str> {
        self.extra
            .as_ref()
            .and_then(|e| e.source.as_ref())
            .and_then(|s| s.original_url.as_deref())
    }
}

/// Hub query errors
#[derive(Debug, Error)]
pub enum KojiError {
    #[error("hub request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("hub returned {status} for build {build_id}")]
    Status {
        build_id: u64,
        status: reqwest::StatusCode,
    },

    #[error("hub response for build {build_id} did not decode: {source}")]
    Decode {
        build_id: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("no hub configured for artifact type '{0}'")]
    NoHub(ArtifactType),
}

/// Build lookup capability
#[async_trait]
pub trait KojiHub: Send + Sync {
    async fn get_build(&self, build_id: u64) -> Result<BuildInfo, KojiError>;
}

/// HTTP hub client with an explicit request timeout
pub struct HttpKojiHub {
    client: reqwest::Client,
    base_url: String,
}

impl HttpKojiHub {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, KojiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl KojiHub for HttpKojiHub {
    async fn get_build(&self, build_id: u64) -> Result<BuildInfo, KojiError> {
        let url = format!(
            "{}/getBuild?buildID={}",
            self.base_url.trim_end_matches('/'),
            build_id
        );
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(KojiError::Status { build_id, status });
        }
        resp.json()
            .await
            .map_err(|source| KojiError::Decode { build_id, source })
    }
}

/// Closed mapping from artifact family to the hub that owns it
#[derive(Clone)]
pub struct KojiHubs {
    fedora: Arc<dyn KojiHub>,
    centos: Arc<dyn KojiHub>,
}

impl KojiHubs {
    pub fn new(fedora: Arc<dyn KojiHub>, centos: Arc<dyn KojiHub>) -> Self {
        Self { fedora, centos }
    }

    /// Which hub resolves builds for this artifact family.
    pub fn for_type(&self, artifact_type: ArtifactType) -> Result<&Arc<dyn KojiHub>, KojiError> {
        match artifact_type {
            ArtifactType::KojiBuild => Ok(&self.fedora),
            ArtifactType::KojiBuildCs => Ok(&self.centos),
            other => Err(KojiError::NoHub(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_info_decodes_hub_payload() {
        let info: BuildInfo = serde_json::from_value(json!({
            "task_id": 42,
            "build_id": 1728223,
            "nvr": "gcompris-qt-1.1-1.fc33",
            "name": "gcompris-qt",
            "extra": {"source": {"original_url": "git+https://src.fedoraproject.org/rpms/gcompris-qt"}},
        }))
        .unwrap();
        assert_eq!(info.task_id, 42);
        assert_eq!(
            info.source_url(),
            Some("git+https://src.fedoraproject.org/rpms/gcompris-qt")
        );
    }

    #[test]
    fn build_info_tolerates_missing_extra() {
        let info: BuildInfo = serde_json::from_value(json!({
            "task_id": 42,
            "nvr": "a-1-1",
            "name": "a",
        }))
        .unwrap();
        assert_eq!(info.source_url(), None);
        assert_eq!(info.build_id, None);
    }
}
