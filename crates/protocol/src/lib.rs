//! Protocol types for the kaijs loader
//!
//! Defines the file-queue envelope written by the broker listener, the
//! per-event `KaiState` record derived from it, and the accumulated
//! `ArtifactModel` document persisted in the artifact store, together with
//! the merge and diff rules that govern document updates.

mod artifact;
mod diff;
mod envelope;
mod error;
mod json;
mod merge;
mod state;
mod topic;

pub use artifact::{
    ArtifactModel, ArtifactPayload, ArtifactType, ContainerImage, ModuleBuild, RpmBuild,
};
pub use diff::{diff_update_set, UpdateSet};
pub use envelope::{FileQueueMessage, FqMsgIdGen};
pub use error::ProtocolError;
pub use json::{get_path, get_str, get_u64};
pub use merge::{merge_arr, merge_scalar, merge_str};
pub use state::{make_state, ArtifactState, KaiState, StateOrigin, LOADER_CREATOR};
pub use topic::TopicPath;
