//! Compiled stage descriptors.
//!
//! A descriptor is produced by the stage compiler and is a capability token
//! for the executor. The bridge reads only its input and output ids.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// The execution environment a stage expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    /// Environment URN, e.g. `beam:env:docker:v1`.
    pub urn: String,
    /// Environment-specific payload.
    #[serde(default, with = "base64_bytes")]
    pub payload: Vec<u8>,
}

impl EnvironmentSpec {
    /// Creates an environment spec.
    #[must_use]
    pub fn new(urn: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            urn: urn.into(),
            payload,
        }
    }

    /// An environment that runs in the same process as the bridge.
    #[must_use]
    pub fn embedded() -> Self {
        Self::new("beam:env:embedded:v1", Vec::new())
    }
}

impl Default for EnvironmentSpec {
    fn default() -> Self {
        Self::embedded()
    }
}

/// An immutable compiled fragment of pipeline logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    input_id: String,
    #[serde(default)]
    outputs: Vec<String>,
    #[serde(default, with = "base64_bytes")]
    transform: Vec<u8>,
    #[serde(default)]
    environment: EnvironmentSpec,
}

impl StageDescriptor {
    /// Creates a descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the input id is empty or an output id repeats.
    pub fn new(
        input_id: impl Into<String>,
        outputs: Vec<String>,
        transform: Vec<u8>,
        environment: EnvironmentSpec,
    ) -> Result<Self, ConfigurationError> {
        let descriptor = Self {
            input_id: input_id.into(),
            outputs,
            transform,
            environment,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Creates a descriptor for an embedded stage with the given ids.
    ///
    /// # Errors
    ///
    /// Same as [`StageDescriptor::new`].
    pub fn embedded(
        input_id: impl Into<String>,
        outputs: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, ConfigurationError> {
        Self::new(
            input_id,
            outputs.into_iter().map(Into::into).collect(),
            Vec::new(),
            EnvironmentSpec::embedded(),
        )
    }

    /// Checks the invariants the bridge relies on.
    ///
    /// # Errors
    ///
    /// Returns an error if the input id is empty or an output id repeats.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.input_id.trim().is_empty() {
            return Err(ConfigurationError::invalid_stage(
                "stage descriptor must declare exactly one input",
            ));
        }
        let mut seen = HashSet::new();
        for output in &self.outputs {
            if !seen.insert(output.as_str()) {
                return Err(ConfigurationError::invalid_stage(format!(
                    "stage output '{output}' is declared more than once"
                )));
            }
        }
        Ok(())
    }

    /// Returns the input id.
    #[must_use]
    pub fn input_id(&self) -> &str {
        &self.input_id
    }

    /// Returns the declared output ids.
    #[must_use]
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Returns the opaque transform fragment.
    #[must_use]
    pub fn transform(&self) -> &[u8] {
        &self.transform
    }

    /// Returns the environment spec.
    #[must_use]
    pub fn environment(&self) -> &EnvironmentSpec {
        &self.environment
    }

    /// Stable hex digest of the descriptor, for logs and events.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.input_id.as_bytes());
        for output in &self.outputs {
            hasher.update([0u8]);
            hasher.update(output.as_bytes());
        }
        hasher.update([0u8]);
        hasher.update(&self.transform);
        hasher.update(self.environment.urn.as_bytes());
        hasher.update(&self.environment.payload);
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_input() {
        let err = StageDescriptor::embedded("", ["out"]).unwrap_err();
        assert_eq!(err.code(), ConfigurationError::INVALID_STAGE);
    }

    #[test]
    fn test_rejects_duplicate_outputs() {
        assert!(StageDescriptor::embedded("input", ["a", "a"]).is_err());
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let a = StageDescriptor::embedded("input", ["out"]).unwrap();
        let b = StageDescriptor::embedded("input", ["out"]).unwrap();
        let c = StageDescriptor::embedded("input", ["other"]).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
    }

    #[test]
    fn test_transform_bytes_survive_json() {
        let descriptor = StageDescriptor::new(
            "input",
            vec!["out".to_string()],
            vec![0, 159, 146, 150],
            EnvironmentSpec::new("beam:env:docker:v1", b"image".to_vec()),
        )
        .unwrap();
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(json.contains("\"transform\":\"AJ+Slg==\""));
        let back: StageDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptor);
    }
}
