//! Artifact document model
//!
//! `ArtifactModel` is the accumulated document for one `(type, aid)` pair.
//! Events fold into it through `merge_payload` and `add_state`; the derived
//! indices (`current_state`, `current_state_lenghts`, `resultsdb_testcase`)
//! are recomputed after every state append.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::merge::{merge_arr, merge_scalar, merge_str};
use crate::state::ArtifactState;
use crate::ProtocolError;

/// Closed set of artifact families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactType {
    #[serde(rename = "koji-build")]
    KojiBuild,
    #[serde(rename = "koji-build-cs")]
    KojiBuildCs,
    #[serde(rename = "brew-build")]
    BrewBuild,
    #[serde(rename = "redhat-module")]
    RedHatModule,
    #[serde(rename = "redhat-container-image")]
    RedHatContainerImage,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::KojiBuild => "koji-build",
            ArtifactType::KojiBuildCs => "koji-build-cs",
            ArtifactType::BrewBuild => "brew-build",
            ArtifactType::RedHatModule => "redhat-module",
            ArtifactType::RedHatContainerImage => "redhat-container-image",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "koji-build" => Ok(ArtifactType::KojiBuild),
            "koji-build-cs" => Ok(ArtifactType::KojiBuildCs),
            "brew-build" => Ok(ArtifactType::BrewBuild),
            "redhat-module" => Ok(ArtifactType::RedHatModule),
            "redhat-container-image" => Ok(ArtifactType::RedHatContainerImage),
            other => Err(ProtocolError::UnknownArtifactType(other.to_string())),
        }
    }
}

/// Partial record for RPM builds (koji-build, koji-build-cs, brew-build)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpmBuild {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nvr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl RpmBuild {
    pub fn merge_from(&mut self, other: RpmBuild) {
        merge_scalar(&mut self.task_id, other.task_id);
        merge_scalar(&mut self.build_id, other.build_id);
        merge_str(&mut self.nvr, other.nvr);
        merge_str(&mut self.issuer, other.issuer);
        merge_str(&mut self.component, other.component);
        merge_str(&mut self.source, other.source);
        merge_scalar(&mut self.scratch, other.scratch);
        merge_arr(&mut self.dependencies, other.dependencies);
    }
}

/// Partial record for module builds (redhat-module)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleBuild {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nsvc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl ModuleBuild {
    pub fn merge_from(&mut self, other: ModuleBuild) {
        merge_str(&mut self.nsvc, other.nsvc);
        merge_str(&mut self.name, other.name);
        merge_str(&mut self.stream, other.stream);
        merge_str(&mut self.version, other.version);
        merge_str(&mut self.context, other.context);
        merge_str(&mut self.issuer, other.issuer);
    }
}

/// Partial record for container images (redhat-container-image)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerImage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nvr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub full_names: Vec<String>,
}

impl ContainerImage {
    pub fn merge_from(&mut self, other: ContainerImage) {
        merge_str(&mut self.id, other.id);
        merge_str(&mut self.nvr, other.nvr);
        merge_str(&mut self.name, other.name);
        merge_str(&mut self.namespace, other.namespace);
        merge_str(&mut self.issuer, other.issuer);
        merge_scalar(&mut self.scratch, other.scratch);
        merge_str(&mut self.source, other.source);
        merge_str(&mut self.registry_url, other.registry_url);
        merge_str(&mut self.tag, other.tag);
        merge_arr(&mut self.full_names, other.full_names);
    }
}

/// Family-specific partial record, serialized under its own top-level key
/// (`rpm_build`, `module_build`, `container_image`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArtifactPayload {
    #[serde(rename = "rpm_build")]
    RpmBuild(RpmBuild),
    #[serde(rename = "module_build")]
    ModuleBuild(ModuleBuild),
    #[serde(rename = "container_image")]
    ContainerImage(ContainerImage),
}

impl ArtifactPayload {
    /// The document key this payload serializes under.
    pub fn key(&self) -> &'static str {
        match self {
            ArtifactPayload::RpmBuild(_) => "rpm_build",
            ArtifactPayload::ModuleBuild(_) => "module_build",
            ArtifactPayload::ContainerImage(_) => "container_image",
        }
    }
}

/// Accumulated document for one `(type, aid)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactModel {
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,

    /// Stringified artifact id (Koji task id, nsvc, image id)
    pub aid: String,

    /// Monotonic document version; starts at 1, bumped on every write
    #[serde(rename = "_version")]
    pub version: u64,

    /// Append-only event history, de-duplicated by `kai_state.msg_id`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<ArtifactState>,

    /// Per observed state, the most recent entry per thread
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub current_state: BTreeMap<String, Vec<ArtifactState>>,

    /// Bucket sizes of `current_state`; field spelling is load-bearing for
    /// document compatibility
    #[serde(
        rename = "current_state_lenghts",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub current_state_lengths: BTreeMap<String, usize>,

    /// Distinct test case names across all states
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resultsdb_testcase: Vec<String>,

    /// Partial record for RPM-build families
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm_build: Option<RpmBuild>,

    /// Partial record for module builds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_build: Option<ModuleBuild>,

    /// Partial record for container images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<ContainerImage>,
}

impl ArtifactModel {
    /// Fresh document for a first event; `_version` starts at 1.
    pub fn new(artifact_type: ArtifactType, aid: impl Into<String>) -> Self {
        Self {
            artifact_type,
            aid: aid.into(),
            version: 1,
            states: Vec::new(),
            current_state: BTreeMap::new(),
            current_state_lengths: BTreeMap::new(),
            resultsdb_testcase: Vec::new(),
            rpm_build: None,
            module_build: None,
            container_image: None,
        }
    }

    /// Document id used by the store adapters
    pub fn doc_id(&self) -> String {
        format!("{}/{}", self.artifact_type, self.aid)
    }

    /// Fold a partial payload into the document per the field merge rules.
    pub fn merge_payload(&mut self, incoming: ArtifactPayload) {
        match incoming {
            ArtifactPayload::RpmBuild(src) => match &mut self.rpm_build {
                Some(dst) => dst.merge_from(src),
                slot @ None => *slot = Some(src),
            },
            ArtifactPayload::ModuleBuild(src) => match &mut self.module_build {
                Some(dst) => dst.merge_from(src),
                slot @ None => *slot = Some(src),
            },
            ArtifactPayload::ContainerImage(src) => match &mut self.container_image {
                Some(dst) => dst.merge_from(src),
                slot @ None => *slot = Some(src),
            },
        }
    }

    /// Append a state unless its `msg_id` is already present, then refresh
    /// the derived indices. Returns whether anything changed.
    pub fn add_state(&mut self, state: ArtifactState) -> bool {
        let msg_id = &state.kai_state.msg_id;
        if self.states.iter().any(|s| &s.kai_state.msg_id == msg_id) {
            return false;
        }
        self.states.push(state);
        self.refresh_derived();
        true
    }

    /// Recompute `current_state`, `current_state_lenghts`, and
    /// `resultsdb_testcase` from `states`.
    ///
    /// Per thread, the entry with the greatest timestamp wins (later append
    /// wins ties); winners are bucketed by their state value, and every
    /// observed state keeps a bucket even when it emptied out.
    pub fn refresh_derived(&mut self) {
        let mut winners: BTreeMap<&str, &ArtifactState> = BTreeMap::new();
        for s in &self.states {
            let slot = winners.entry(&s.kai_state.thread_id).or_insert(s);
            if s.kai_state.timestamp >= slot.kai_state.timestamp {
                *slot = s;
            }
        }

        let mut current: BTreeMap<String, Vec<ArtifactState>> = BTreeMap::new();
        for s in &self.states {
            if !s.kai_state.state.is_empty() {
                current.entry(s.kai_state.state.clone()).or_default();
            }
        }
        for winner in winners.values() {
            if !winner.kai_state.state.is_empty() {
                current
                    .entry(winner.kai_state.state.clone())
                    .or_default()
                    .push((*winner).clone());
            }
        }

        self.current_state_lengths = current
            .iter()
            .map(|(state, bucket)| (state.clone(), bucket.len()))
            .collect();
        self.current_state = current;

        let mut seen = Vec::new();
        for s in &self.states {
            if let Some(name) = &s.kai_state.test_case_name {
                if !name.is_empty() && !seen.contains(name) {
                    seen.push(name.clone());
                }
            }
        }
        self.resultsdb_testcase = seen;
    }
}

#[cfg(test)]
#[path = "artifact_test.rs"]
mod artifact_test;
