//! Broker topic parsing
//!
//! The last two dot-delimited segments of a topic carry the CI stage and
//! state (`...koji-build.test.complete` → stage `test`, state `complete`).
//! CI topics also name the artifact family one segment earlier; schema
//! lookup is keyed on it so each family can declare its own required
//! fields.

use std::str::FromStr;

use crate::{ArtifactType, ProtocolError};

/// Parsed tail of a broker topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPath {
    /// Artifact family segment preceding `stage`, when it names one
    /// (`koji-build`, `redhat-module`, ...)
    pub family: Option<String>,
    /// Second-to-last segment (`test`, `build`, `buildsys`)
    pub stage: String,
    /// Last segment (`queued`, `running`, `complete`, `error`, `tag`)
    pub state: String,
}

impl TopicPath {
    /// Split the stage/state suffix off a dotted topic.
    pub fn parse(topic: &str) -> Result<Self, ProtocolError> {
        let mut segs = topic.rsplit('.');
        let state = segs.next().filter(|s| !s.is_empty());
        let stage = segs.next().filter(|s| !s.is_empty());
        let family = segs
            .next()
            .filter(|s| ArtifactType::from_str(s).is_ok())
            .map(str::to_string);
        match (stage, state) {
            (Some(stage), Some(state)) => Ok(Self {
                family,
                stage: stage.to_string(),
                state: state.to_string(),
            }),
            _ => Err(ProtocolError::ShortTopic(topic.to_string())),
        }
    }

    /// Schema name for a topic: the family-qualified suffix for CI topics
    /// (`koji-build.test.complete`), the stage/state suffix otherwise
    /// (`buildsys.tag`).
    pub fn schema_name(&self) -> String {
        match &self.family {
            Some(family) => format!("{}.{}.{}", family, self.stage, self.state),
            None => format!("{}.{}", self.stage, self.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_last_two_segments() {
        let t = TopicPath::parse("org.centos.prod.ci.koji-build.test.complete").unwrap();
        assert_eq!(t.stage, "test");
        assert_eq!(t.state, "complete");
        assert_eq!(t.family.as_deref(), Some("koji-build"));
        assert_eq!(t.schema_name(), "koji-build.test.complete");
    }

    #[test]
    fn non_family_segment_is_ignored() {
        let t = TopicPath::parse("org.fedoraproject.prod.buildsys.tag").unwrap();
        assert_eq!(t.stage, "buildsys");
        assert_eq!(t.state, "tag");
        assert_eq!(t.family, None);
        assert_eq!(t.schema_name(), "buildsys.tag");
    }

    #[test]
    fn every_family_qualifies_its_schema() {
        for family in [
            "koji-build",
            "koji-build-cs",
            "brew-build",
            "redhat-module",
            "redhat-container-image",
        ] {
            let topic = format!("org.centos.prod.ci.{}.test.queued", family);
            let t = TopicPath::parse(&topic).unwrap();
            assert_eq!(t.schema_name(), format!("{}.test.queued", family));
        }
    }

    #[test]
    fn rejoining_reproduces_suffix() {
        let topic = "org.fedoraproject.prod.buildsys.tag";
        let t = TopicPath::parse(topic).unwrap();
        assert!(topic.ends_with(&format!("{}.{}", t.stage, t.state)));
    }

    #[test]
    fn short_topic_is_an_error() {
        assert!(TopicPath::parse("tag").is_err());
        assert!(TopicPath::parse("").is_err());
        assert!(TopicPath::parse(".tag").is_err());
    }

    #[test]
    fn two_segment_topic_has_no_family() {
        let t = TopicPath::parse("test.complete").unwrap();
        assert_eq!(t.family, None);
        assert_eq!(t.schema_name(), "test.complete");
    }
}
