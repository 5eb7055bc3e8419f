//! Per-topic event projections
//!
//! A handler turns one envelope into a proposed artifact document: compute
//! the `(type, aid)` identity, fetch-or-create the document, fold the
//! partial sub-record in, and append the CI state when the event carries
//! one. Handlers never write; the updater owns persistence.

use std::sync::Arc;

use serde_json::Value;

use kaijs_protocol::{
    get_path, get_str, get_u64, make_state, ArtifactModel, ArtifactPayload, ArtifactType,
    ContainerImage, FileQueueMessage, ModuleBuild, ProtocolError, RpmBuild,
};
use kaijs_routing::HandlerKind;
use kaijs_store::{DocStore, StoreError};

use crate::koji::{KojiError, KojiHubs};

/// Why a projection could not produce a document
#[derive(Debug)]
pub enum ProjectionFailure {
    /// Body problem; sideline to the invalid store and commit
    Invalid { path: String, message: String },
    /// Hub lookup failed; roll back for redelivery
    External(KojiError),
    /// Store failure underneath find-or-create
    Store(StoreError),
}

impl ProjectionFailure {
    fn missing(path: &str) -> Self {
        Self::Invalid {
            path: path.to_string(),
            message: "required identity field is missing".to_string(),
        }
    }
}

impl From<ProtocolError> for ProjectionFailure {
    fn from(e: ProtocolError) -> Self {
        let path = match &e {
            ProtocolError::NoThreadId => "pipeline.id",
            ProtocolError::BadTimestamp(_) => "generated_at",
            _ => "",
        };
        Self::Invalid {
            path: path.to_string(),
            message: e.to_string(),
        }
    }
}

impl From<StoreError> for ProjectionFailure {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Capabilities a projection runs against
pub struct HandlerContext {
    pub store: Arc<dyn DocStore>,
    pub hubs: KojiHubs,
}

/// Identity plus partial sub-record extracted from one envelope
pub(crate) struct EventParts {
    pub artifact_type: ArtifactType,
    pub aid: String,
    pub payload: ArtifactPayload,
    /// Whether this event carries observable CI state
    pub has_state: bool,
}

/// Run the projection for a resolved handler.
///
/// The event's full fold is computed first so that a new `(type, aid)` pair
/// is created as the complete document; creation does not count as a
/// mutating write, so a first event leaves `_version = 1`.
pub async fn project(
    kind: HandlerKind,
    ctx: &HandlerContext,
    envelope: &FileQueueMessage,
) -> Result<ArtifactModel, ProjectionFailure> {
    let parts = event_parts(kind, ctx, envelope).await?;
    let state = if parts.has_state {
        Some(make_state(envelope)?)
    } else {
        None
    };

    let mut candidate = ArtifactModel::new(parts.artifact_type, parts.aid.clone());
    candidate.merge_payload(parts.payload.clone());
    if let Some(state) = &state {
        candidate.add_state(state.clone());
    }

    let (existing, created) = ctx.store.find_or_create(&candidate).await?;
    if created {
        tracing::debug!(artifact = %candidate.doc_id(), "artifact document created");
        return Ok(candidate);
    }

    let mut model = existing;
    model.merge_payload(parts.payload);
    if let Some(state) = state {
        if !model.add_state(state) {
            tracing::debug!(
                artifact = %model.doc_id(),
                msg_id = %envelope.broker_msg_id,
                "state already recorded, duplicate delivery"
            );
        }
    }
    Ok(model)
}

/// Extract identity and payload for an envelope without touching the store.
///
/// The bulk path builds its upserts from these parts; the stream path folds
/// them into the fetched document.
pub(crate) async fn event_parts(
    kind: HandlerKind,
    ctx: &HandlerContext,
    envelope: &FileQueueMessage,
) -> Result<EventParts, ProjectionFailure> {
    match kind {
        HandlerKind::BuildTag => tag_parts(ctx, envelope).await,
        HandlerKind::KojiBuildTest => rpm_parts(envelope, ArtifactType::KojiBuild),
        HandlerKind::KojiBuildCsTest => rpm_parts(envelope, ArtifactType::KojiBuildCs),
        HandlerKind::BrewBuildTest => rpm_parts(envelope, ArtifactType::BrewBuild),
        HandlerKind::ModuleTest => module_parts(envelope),
        HandlerKind::ContainerImageTest => container_parts(envelope),
    }
}

/// Build-tag events: resolve the task id through the owning hub and fold the
/// build metadata in. Tag events carry no CI state.
async fn tag_parts(
    ctx: &HandlerContext,
    envelope: &FileQueueMessage,
) -> Result<EventParts, ProjectionFailure> {
    let artifact_type = if envelope.broker_topic.starts_with("org.fedoraproject.") {
        ArtifactType::KojiBuild
    } else {
        ArtifactType::KojiBuildCs
    };

    let body = &envelope.body;
    let build_id =
        get_u64(body, "build_id").ok_or_else(|| ProjectionFailure::missing("build_id"))?;

    let hub = ctx
        .hubs
        .for_type(artifact_type)
        .map_err(ProjectionFailure::External)?;
    let info = hub
        .get_build(build_id)
        .await
        .map_err(ProjectionFailure::External)?;

    let source = info.source_url().map(str::to_string);
    Ok(EventParts {
        artifact_type,
        aid: info.task_id.to_string(),
        payload: ArtifactPayload::RpmBuild(RpmBuild {
            task_id: Some(info.task_id),
            build_id: Some(build_id),
            nvr: Some(info.nvr),
            issuer: get_str(body, "owner").map(str::to_string),
            component: Some(info.name),
            source,
            scratch: Some(false),
            dependencies: Vec::new(),
        }),
        has_state: false,
    })
}

fn rpm_parts(
    envelope: &FileQueueMessage,
    artifact_type: ArtifactType,
) -> Result<EventParts, ProjectionFailure> {
    let body = &envelope.body;
    let aid = get_u64(body, "artifact.id")
        .map(|id| id.to_string())
        .or_else(|| get_str(body, "artifact.id").map(str::to_string))
        .ok_or_else(|| ProjectionFailure::missing("artifact.id"))?;

    Ok(EventParts {
        artifact_type,
        aid,
        payload: ArtifactPayload::RpmBuild(RpmBuild {
            task_id: get_u64(body, "artifact.id"),
            build_id: get_u64(body, "artifact.build_id"),
            nvr: get_str(body, "artifact.nvr").map(str::to_string),
            issuer: get_str(body, "artifact.issuer").map(str::to_string),
            component: get_str(body, "artifact.component").map(str::to_string),
            source: get_str(body, "artifact.source").map(str::to_string),
            scratch: get_path(body, "artifact.scratch").and_then(Value::as_bool),
            dependencies: string_array(body, "artifact.dependencies"),
        }),
        has_state: true,
    })
}

/// Module identity is the nsvc; fall back to the artifact id when a producer
/// omits it.
fn module_parts(envelope: &FileQueueMessage) -> Result<EventParts, ProjectionFailure> {
    let body = &envelope.body;
    let aid = get_str(body, "artifact.nsvc")
        .map(str::to_string)
        .or_else(|| get_u64(body, "artifact.id").map(|id| id.to_string()))
        .ok_or_else(|| ProjectionFailure::missing("artifact.nsvc"))?;

    Ok(EventParts {
        artifact_type: ArtifactType::RedHatModule,
        aid,
        payload: ArtifactPayload::ModuleBuild(ModuleBuild {
            nsvc: get_str(body, "artifact.nsvc").map(str::to_string),
            name: get_str(body, "artifact.name").map(str::to_string),
            stream: get_str(body, "artifact.stream").map(str::to_string),
            version: get_str(body, "artifact.version").map(str::to_string),
            context: get_str(body, "artifact.context").map(str::to_string),
            issuer: get_str(body, "artifact.issuer").map(str::to_string),
        }),
        has_state: true,
    })
}

fn container_parts(envelope: &FileQueueMessage) -> Result<EventParts, ProjectionFailure> {
    let body = &envelope.body;
    let aid = get_str(body, "artifact.id")
        .map(str::to_string)
        .or_else(|| get_u64(body, "artifact.id").map(|id| id.to_string()))
        .ok_or_else(|| ProjectionFailure::missing("artifact.id"))?;

    Ok(EventParts {
        artifact_type: ArtifactType::RedHatContainerImage,
        aid: aid.clone(),
        payload: ArtifactPayload::ContainerImage(ContainerImage {
            id: Some(aid),
            nvr: get_str(body, "artifact.nvr").map(str::to_string),
            name: get_str(body, "artifact.name").map(str::to_string),
            namespace: get_str(body, "artifact.namespace").map(str::to_string),
            issuer: get_str(body, "artifact.issuer").map(str::to_string),
            scratch: get_path(body, "artifact.scratch").and_then(Value::as_bool),
            source: get_str(body, "artifact.source").map(str::to_string),
            registry_url: get_str(body, "artifact.registry_url").map(str::to_string),
            tag: get_str(body, "artifact.tag").map(str::to_string),
            full_names: string_array(body, "artifact.full_names"),
        }),
        has_state: true,
    })
}

fn string_array(body: &Value, path: &str) -> Vec<String> {
    get_path(body, path)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "handlers_test.rs"]
mod handlers_test;
