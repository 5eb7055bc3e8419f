//! Durable directory-backed FIFO
//!
//! The file queue is the hand-off buffer between the broker listener and the
//! loader: the listener persists every accepted message here before
//! acknowledging it, and the loader drains it at database speed. Entries
//! survive restarts; a transactional pop hides an entry from other consumers
//! without deleting it until the caller commits.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   queue/     visible entries, one JSON file per envelope, FIFO by name
//!   tmp/       in-progress writes, renamed into queue/ when complete
//!   claimed/   popped-but-uncommitted entries
//! ```
//!
//! A push writes to `tmp/`, fsyncs the file, renames into `queue/`, and
//! fsyncs the directory, so a crash never leaves a half-written visible
//! entry. On open, leftovers in `claimed/` are returned to `queue/` and
//! leftovers in `tmp/` are discarded.

mod error;
mod queue;

pub use error::FileQueueError;
pub use queue::{FileQueue, FileQueueConfig, PoppedMessage, QueueMetrics, QueueSnapshot};
