//! Topic routing for broker messages
//!
//! The registry is compiled once at startup from an ordered list of
//! (pattern, handler) pairs, declared most-specific first. The hot path is a
//! linear scan over pre-compiled regexes; the table is small and the scan
//! stops at the first full match.

mod error;
mod registry;

pub use error::RoutingError;
pub use registry::{HandlerKind, HandlerRegistry};
