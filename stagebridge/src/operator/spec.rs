//! The transferable half of an operator.

use crate::config::OperatorConfig;
use crate::core::{JobInfo, StageDescriptor, TagRegistry};
use crate::errors::{ConfigurationError, Result};
use serde::{Deserialize, Serialize};

/// Everything an operator needs to be rebuilt on another worker.
///
/// Live resources (bundle factory, router, open bundle) are never part of
/// the spec; they are recreated from it on first use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorSpec {
    /// Name of the step in the host's job graph.
    pub step_name: String,
    /// The compiled stage.
    pub descriptor: StageDescriptor,
    /// Tag declarations for every output of the stage.
    pub outputs: TagRegistry,
    /// Identity of the job.
    pub job_info: JobInfo,
    /// Bundle bounds and event settings.
    #[serde(default)]
    pub config: OperatorConfig,
}

impl OperatorSpec {
    /// Creates a spec with the default configuration.
    #[must_use]
    pub fn new(
        step_name: impl Into<String>,
        descriptor: StageDescriptor,
        outputs: TagRegistry,
        job_info: JobInfo,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            descriptor,
            outputs,
            job_info,
            config: OperatorConfig::default(),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: OperatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Checks everything that must hold before the operator starts.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found.
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.step_name.trim().is_empty() {
            return Err(ConfigurationError::invalid_stage("step name cannot be empty"));
        }
        if self.job_info.job_id().trim().is_empty() {
            return Err(ConfigurationError::invalid_stage("job id cannot be empty"));
        }
        self.descriptor.validate()?;
        self.outputs.validate(self.descriptor.outputs())?;
        self.config.validate()
    }

    /// Serializes the spec.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserializes and validates a spec.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let spec: Self = serde_json::from_slice(bytes)?;
        spec.validate()?;
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChannelId, CodecSpec};
    use pretty_assertions::assert_eq;

    fn spec() -> OperatorSpec {
        OperatorSpec::new(
            "ParDo(Split)",
            StageDescriptor::embedded("input", ["main-output", "output-1"]).unwrap(),
            TagRegistry::new("main-output", CodecSpec::varint())
                .with_side_output("output-1", CodecSpec::varint()),
            JobInfo::create("job-1", "word-count", serde_json::json!({"parallelism": 4})).unwrap(),
        )
    }

    #[test]
    fn test_valid_spec() {
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn test_bytes_round_trip_keeps_identity() {
        let original = spec();
        let restored = OperatorSpec::from_bytes(&original.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, original);
        assert_eq!(restored.job_info.option("parallelism"), Some(&serde_json::json!(4)));
    }

    #[test]
    fn test_empty_step_name_rejected() {
        let mut spec = spec();
        spec.step_name = " ".to_string();
        assert_eq!(spec.validate().unwrap_err().code(), ConfigurationError::INVALID_STAGE);
    }

    #[test]
    fn test_undeclared_descriptor_output_rejected() {
        let mut spec = spec();
        spec.outputs = TagRegistry::new("main-output", CodecSpec::varint());
        let err = spec.validate().unwrap_err();
        assert_eq!(err.code(), ConfigurationError::UNDECLARED_OUTPUT);
        assert_eq!(err.tag.as_deref(), Some("output-1"));
    }

    #[test]
    fn test_shared_channel_rejected() {
        let mut spec = spec();
        spec.descriptor = StageDescriptor::embedded("input", Vec::<String>::new()).unwrap();
        spec.outputs = TagRegistry::new("main-output", CodecSpec::varint())
            .with_additional("a", ChannelId::new("side"), CodecSpec::varint())
            .with_additional("b", ChannelId::new("side"), CodecSpec::varint());
        assert_eq!(
            spec.validate().unwrap_err().code(),
            ConfigurationError::DUPLICATE_CHANNEL
        );
    }

    #[test]
    fn test_zero_bundle_size_rejected() {
        let spec = spec().with_config(OperatorConfig::new().with_max_bundle_size(0));
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        let err = OperatorSpec::from_bytes(b"not json").unwrap_err();
        assert!(matches!(err, crate::errors::BridgeError::Serialization(_)));
    }

    #[test]
    fn test_from_bytes_validates() {
        let mut spec = spec();
        spec.outputs = TagRegistry::new("main-output", CodecSpec::new(""));
        let bytes = serde_json::to_vec(&spec).unwrap();
        assert!(OperatorSpec::from_bytes(&bytes).unwrap_err().is_configuration());
    }
}
