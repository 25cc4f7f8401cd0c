//! Ready-made operator specs for tests.

use crate::config::OperatorConfig;
use crate::core::{CodecSpec, JobInfo, StageDescriptor, TagRegistry};
use crate::errors::ConfigurationError;
use crate::operator::OperatorSpec;

/// Builds an [`OperatorSpec`] whose stage declares exactly the given tags.
#[derive(Debug, Clone)]
pub struct OperatorFixture {
    /// Step name.
    pub step_name: String,
    /// Main tag.
    pub main_tag: String,
    /// Additional tags, each routed to a side channel of the same name.
    pub side_tags: Vec<String>,
    /// Operator configuration.
    pub config: OperatorConfig,
}

impl OperatorFixture {
    /// Creates a fixture with only a main tag.
    #[must_use]
    pub fn new(main_tag: impl Into<String>) -> Self {
        Self {
            step_name: "test-step".to_string(),
            main_tag: main_tag.into(),
            side_tags: Vec::new(),
            config: OperatorConfig::default(),
        }
    }

    /// Adds an additional tag.
    #[must_use]
    pub fn with_side_output(mut self, tag: impl Into<String>) -> Self {
        self.side_tags.push(tag.into());
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: OperatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the tag registry, every tag using the varint codec.
    #[must_use]
    pub fn registry(&self) -> TagRegistry {
        self.side_tags.iter().fold(
            TagRegistry::new(self.main_tag.as_str(), CodecSpec::varint()),
            |registry, tag| registry.with_side_output(tag.as_str(), CodecSpec::varint()),
        )
    }

    /// Builds the spec.
    ///
    /// # Errors
    ///
    /// Returns an error if the tags do not form a valid stage.
    pub fn spec(&self) -> Result<OperatorSpec, ConfigurationError> {
        let outputs = std::iter::once(&self.main_tag).chain(&self.side_tags);
        let descriptor = StageDescriptor::embedded("input", outputs.map(String::as_str))?;
        let job_info = test_job_info()?;
        let spec = OperatorSpec::new(self.step_name.clone(), descriptor, self.registry(), job_info)
            .with_config(self.config.clone());
        spec.validate()?;
        Ok(spec)
    }
}

/// Returns the job identity used by fixtures.
///
/// # Errors
///
/// Never fails for the fixed id; the result mirrors [`JobInfo::create`].
pub fn test_job_info() -> Result<JobInfo, ConfigurationError> {
    JobInfo::create("job-id", "test-job", serde_json::json!({"experiments": []}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fixture_declares_all_tags() {
        let spec = OperatorFixture::new("main-output")
            .with_side_output("output-1")
            .with_side_output("output-2")
            .spec()
            .unwrap();

        assert_eq!(
            spec.descriptor.outputs(),
            &["main-output".to_string(), "output-1".to_string(), "output-2".to_string()]
        );
        assert!(spec.outputs.contains("output-2"));
        assert_eq!(spec.job_info.job_id(), "job-id");
    }

    #[test]
    fn test_fixture_rejects_repeated_tag() {
        let result = OperatorFixture::new("main").with_side_output("main").spec();
        assert!(result.is_err());
    }
}
