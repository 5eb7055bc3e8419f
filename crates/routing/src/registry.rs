//! Handler registry
//!
//! Maps broker topics to handler kinds. Patterns must match the full topic;
//! registration order is precedence order, most-specific first.

use regex::Regex;

use crate::error::RoutingError;

/// The handler families the pipeline dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Build-system tag events (`...buildsys.tag`)
    BuildTag,
    /// CI test-state events for Fedora Koji builds
    KojiBuildTest,
    /// CI test-state events for CentOS Stream Koji builds
    KojiBuildCsTest,
    /// CI test-state events for Brew builds
    BrewBuildTest,
    /// CI test-state events for modules
    ModuleTest,
    /// CI test-state events for container images
    ContainerImageTest,
}

/// Ordered pattern → handler table, compiled once
pub struct HandlerRegistry {
    entries: Vec<(Regex, HandlerKind)>,
}

impl HandlerRegistry {
    /// Build a registry from `(pattern, handler)` pairs.
    ///
    /// Each pattern is anchored to the full topic.
    pub fn from_patterns(
        patterns: &[(&str, HandlerKind)],
    ) -> Result<Self, RoutingError> {
        let mut entries = Vec::with_capacity(patterns.len());
        for (pattern, handler) in patterns {
            let anchored = format!("^(?:{})$", pattern);
            let regex = Regex::new(&anchored).map_err(|e| RoutingError::BadPattern {
                pattern: (*pattern).to_string(),
                source: e,
            })?;
            entries.push((regex, *handler));
        }
        Ok(Self { entries })
    }

    /// The production topic table.
    pub fn with_default_routes() -> Self {
        Self::from_patterns(&[
            (
                r"org\.(centos|fedoraproject)\.prod\.buildsys\.tag",
                HandlerKind::BuildTag,
            ),
            (
                r"org\.centos\.prod\.ci\.koji-build\.test\.(complete|queued|running|error)",
                HandlerKind::KojiBuildTest,
            ),
            (
                r"org\.centos\.prod\.ci\.koji-build-cs\.test\.(complete|queued|running|error)",
                HandlerKind::KojiBuildCsTest,
            ),
            (
                r"org\.centos\.prod\.ci\.brew-build\.test\.(complete|queued|running|error)",
                HandlerKind::BrewBuildTest,
            ),
            (
                r"org\.centos\.prod\.ci\.redhat-module\.test\.(complete|queued|running|error)",
                HandlerKind::ModuleTest,
            ),
            (
                r"org\.centos\.prod\.ci\.redhat-container-image\.test\.(complete|queued|running|error)",
                HandlerKind::ContainerImageTest,
            ),
        ])
        .expect("default route patterns compile")
    }

    /// Resolve a topic to its handler: first full match wins.
    pub fn resolve(&self, topic: &str) -> Result<HandlerKind, RoutingError> {
        self.entries
            .iter()
            .find(|(regex, _)| regex.is_match(topic))
            .map(|(_, handler)| *handler)
            .ok_or_else(|| RoutingError::NoHandler(topic.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
