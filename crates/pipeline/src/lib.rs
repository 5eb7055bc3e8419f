//! Event-to-artifact pipeline
//!
//! Drives envelopes from the file queue into the document store: resolve
//! the handler for the topic, validate the body, project the event onto the
//! artifact document, and persist through the optimistic CAS loop (or the
//! bulk path for the indexed backend).

mod bulk;
mod consumer;
mod error;
mod handlers;
mod koji;
mod metrics;
#[cfg(test)]
mod testutil;
mod updater;

pub use bulk::{BulkConfig, BulkLoader};
pub use consumer::Loader;
pub use error::PipelineError;
pub use handlers::{project, HandlerContext};
pub use koji::{BuildExtra, BuildInfo, BuildSource, HttpKojiHub, KojiError, KojiHub, KojiHubs};
pub use metrics::{LoaderMetrics, LoaderSnapshot};
pub use updater::{Outcome, Updater, MAX_UPDATE_ATTEMPTS};
