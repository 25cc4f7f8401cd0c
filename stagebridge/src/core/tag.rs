//! Output tags and the tag registry.

use super::CodecSpec;
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Stable identity of one output stream of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    /// Creates a tag.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the tag id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Tag {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identity of a host side-output channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Creates a channel id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the channel id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a routed value lands on the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputChannel {
    /// The operator's primary output.
    Main,
    /// A named side output.
    Side(ChannelId),
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("<main>"),
            Self::Side(id) => write!(f, "{id}"),
        }
    }
}

/// An additional tag's declared destination and codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalOutput {
    /// The tag.
    pub tag: Tag,
    /// The host side channel receiving the tag's values.
    pub channel: ChannelId,
    /// The tag's value codec.
    pub codec: CodecSpec,
}

/// The fixed set of tags an operator routes, each bound to a channel and codec.
///
/// Built once by the host before the operator starts and never mutated.
/// Additional tags keep their declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRegistry {
    main_tag: Tag,
    main_codec: CodecSpec,
    #[serde(default)]
    additional: Vec<AdditionalOutput>,
}

impl TagRegistry {
    /// Creates a registry with only a main tag.
    #[must_use]
    pub fn new(main_tag: impl Into<Tag>, main_codec: CodecSpec) -> Self {
        Self {
            main_tag: main_tag.into(),
            main_codec,
            additional: Vec::new(),
        }
    }

    /// Declares an additional tag routed to the given side channel.
    #[must_use]
    pub fn with_additional(
        mut self,
        tag: impl Into<Tag>,
        channel: ChannelId,
        codec: CodecSpec,
    ) -> Self {
        self.additional.push(AdditionalOutput {
            tag: tag.into(),
            channel,
            codec,
        });
        self
    }

    /// Declares an additional tag whose side channel shares the tag's id.
    #[must_use]
    pub fn with_side_output(self, tag: impl Into<Tag>, codec: CodecSpec) -> Self {
        let tag = tag.into();
        let channel = ChannelId::new(tag.id());
        self.with_additional(tag, channel, codec)
    }

    /// Returns the main tag.
    #[must_use]
    pub fn main_tag(&self) -> &Tag {
        &self.main_tag
    }

    /// Returns the main tag's codec.
    #[must_use]
    pub fn main_codec(&self) -> &CodecSpec {
        &self.main_codec
    }

    /// Returns the additional outputs in declaration order.
    #[must_use]
    pub fn additional(&self) -> &[AdditionalOutput] {
        &self.additional
    }

    /// Returns all tags, main first.
    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        std::iter::once(&self.main_tag).chain(self.additional.iter().map(|o| &o.tag))
    }

    /// Returns true if the tag is declared.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.tags().any(|t| t.id() == tag)
    }

    /// Validates the registry on its own and against the stage's declared outputs.
    ///
    /// An empty `stage_outputs` skips the coverage check.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for a missing codec, a repeated tag,
    /// two tags sharing a channel, or a stage output without a tag.
    pub fn validate(&self, stage_outputs: &[String]) -> Result<(), ConfigurationError> {
        if self.main_tag.id().trim().is_empty() {
            return Err(ConfigurationError::invalid_stage("main tag cannot be empty"));
        }
        if !self.main_codec.is_well_formed() {
            return Err(ConfigurationError::missing_codec(self.main_tag.id()));
        }

        let mut seen_tags: HashSet<&str> = HashSet::new();
        seen_tags.insert(self.main_tag.id());
        let mut seen_channels: HashSet<&ChannelId> = HashSet::new();

        for output in &self.additional {
            if output.tag.id().trim().is_empty() {
                return Err(ConfigurationError::invalid_stage("additional tag cannot be empty"));
            }
            if !seen_tags.insert(output.tag.id()) {
                return Err(ConfigurationError::invalid_stage(format!(
                    "tag '{}' is declared more than once",
                    output.tag
                )));
            }
            if !output.codec.is_well_formed() {
                return Err(ConfigurationError::missing_codec(output.tag.id()));
            }
            if !seen_channels.insert(&output.channel) {
                return Err(ConfigurationError::duplicate_channel(
                    output.tag.id(),
                    &output.channel,
                ));
            }
        }

        if let Some(missing) = stage_outputs.iter().find(|id| !seen_tags.contains(id.as_str())) {
            return Err(ConfigurationError::undeclared_output(missing.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TagRegistry {
        TagRegistry::new("main-output", CodecSpec::varint())
            .with_side_output("output-1", CodecSpec::varint())
            .with_side_output("output-2", CodecSpec::varint())
    }

    #[test]
    fn test_tags_main_first() {
        let reg = registry();
        let ids: Vec<&str> = reg.tags().map(Tag::id).collect();
        assert_eq!(ids, vec!["main-output", "output-1", "output-2"]);
    }

    #[test]
    fn test_validate_ok_with_matching_outputs() {
        let outputs = vec!["main-output".to_string(), "output-2".to_string()];
        assert!(registry().validate(&outputs).is_ok());
        assert!(registry().validate(&[]).is_ok());
    }

    #[test]
    fn test_validate_rejects_undeclared_stage_output() {
        let err = registry()
            .validate(&["main-output".to_string(), "output-3".to_string()])
            .unwrap_err();
        assert_eq!(err.code(), ConfigurationError::UNDECLARED_OUTPUT);
        assert_eq!(err.tag.as_deref(), Some("output-3"));
    }

    #[test]
    fn test_validate_rejects_missing_codec() {
        let reg = TagRegistry::new("main", CodecSpec::varint())
            .with_side_output("side", CodecSpec::new(""));
        let err = reg.validate(&[]).unwrap_err();
        assert_eq!(err.code(), ConfigurationError::MISSING_CODEC);
    }

    #[test]
    fn test_validate_rejects_shared_channel() {
        let reg = TagRegistry::new("main", CodecSpec::varint())
            .with_additional("a", ChannelId::new("side"), CodecSpec::varint())
            .with_additional("b", ChannelId::new("side"), CodecSpec::varint());
        let err = reg.validate(&[]).unwrap_err();
        assert_eq!(err.code(), ConfigurationError::DUPLICATE_CHANNEL);
        assert_eq!(err.tag.as_deref(), Some("b"));
    }

    #[test]
    fn test_validate_rejects_main_repeated_as_additional() {
        let reg = TagRegistry::new("main", CodecSpec::varint())
            .with_side_output("main", CodecSpec::varint());
        assert!(reg.validate(&[]).is_err());
    }

    #[test]
    fn test_contains() {
        let reg = registry();
        assert!(reg.contains("output-1"));
        assert!(!reg.contains("output-9"));
    }
}
