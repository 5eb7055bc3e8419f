//! Routing error types

use thiserror::Error;

/// Errors from building or consulting the handler registry
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Topic matched no registered pattern
    #[error("no handler for topic '{0}'")]
    NoHandler(String),

    /// A registry pattern failed to compile
    #[error("invalid handler pattern '{pattern}': {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
