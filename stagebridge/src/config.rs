//! Operator configuration.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounds that force an open bundle to close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Elements sent before the bundle is closed.
    #[serde(default = "default_max_bundle_size")]
    pub max_bundle_size: u64,
    /// Milliseconds a bundle may stay open.
    #[serde(default = "default_max_bundle_time_ms")]
    pub max_bundle_time_ms: u64,
}

fn default_max_bundle_size() -> u64 {
    1000
}

fn default_max_bundle_time_ms() -> u64 {
    1000
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            max_bundle_size: default_max_bundle_size(),
            max_bundle_time_ms: default_max_bundle_time_ms(),
        }
    }
}

impl BundleConfig {
    /// Gets the time bound as a Duration.
    #[must_use]
    pub fn max_bundle_time(&self) -> Duration {
        Duration::from_millis(self.max_bundle_time_ms)
    }
}

/// Configuration carried inside an operator's spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Bundle bounds.
    #[serde(default)]
    pub bundle: BundleConfig,
    /// Whether lifecycle events are sent to the event sink.
    #[serde(default = "default_emit_events")]
    pub emit_events: bool,
}

fn default_emit_events() -> bool {
    true
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            bundle: BundleConfig::default(),
            emit_events: default_emit_events(),
        }
    }
}

impl OperatorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the element bound.
    #[must_use]
    pub fn with_max_bundle_size(mut self, size: u64) -> Self {
        self.bundle.max_bundle_size = size;
        self
    }

    /// Sets the time bound.
    #[must_use]
    pub fn with_max_bundle_time(mut self, time: Duration) -> Self {
        self.bundle.max_bundle_time_ms = u64::try_from(time.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enables or disables lifecycle events.
    #[must_use]
    pub fn with_events(mut self, enabled: bool) -> Self {
        self.emit_events = enabled;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if `max_bundle_size` is zero.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.bundle.max_bundle_size == 0 {
            return Err(ConfigurationError::invalid_stage(
                "bundle.max_bundle_size must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: OperatorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, OperatorConfig::default());
        assert_eq!(config.bundle.max_bundle_size, 1000);
        assert_eq!(config.bundle.max_bundle_time(), Duration::from_secs(1));
        assert!(config.emit_events);
    }

    #[test]
    fn test_partial_bundle_section() {
        let config: OperatorConfig =
            serde_json::from_str(r#"{"bundle": {"max_bundle_size": 5}}"#).unwrap();
        assert_eq!(config.bundle.max_bundle_size, 5);
        assert_eq!(config.bundle.max_bundle_time_ms, 1000);
    }

    #[test]
    fn test_builder() {
        let config = OperatorConfig::new()
            .with_max_bundle_size(1)
            .with_max_bundle_time(Duration::from_millis(250))
            .with_events(false);
        assert_eq!(config.bundle.max_bundle_size, 1);
        assert_eq!(config.bundle.max_bundle_time_ms, 250);
        assert!(!config.emit_events);
    }

    #[test]
    fn test_zero_bundle_size_rejected() {
        let err = OperatorConfig::new().with_max_bundle_size(0).validate().unwrap_err();
        assert_eq!(err.code(), ConfigurationError::INVALID_STAGE);
    }
}
