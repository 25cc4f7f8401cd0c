//! Error types for the bundle execution bridge.
//!
//! The taxonomy separates misconfiguration (never recovered locally),
//! executor-side faults (fatal for the current bundle) and failures while
//! releasing resources. Lower-level causes are always preserved.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// The main error type for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Unknown tag, missing codec or destination, invalid stage.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A failure while opening, sending to or closing a bundle.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// A failure while releasing the bundle factory.
    #[error("{0}")]
    ResourceRelease(#[from] ResourceReleaseError),

    /// An operation was called in a state that forbids it.
    #[error("Illegal operator state: {0}")]
    IllegalState(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BridgeError {
    /// Returns true if this is a configuration error.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns the executor-side cause, if this error wraps one.
    #[must_use]
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Execution(err) => Some(err.cause()),
            Self::ResourceRelease(err) => Some(err.cause()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "BRIDGE-001-UNKNOWN_TAG").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a JSON representation.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Raised when tags, codecs, channels or the stage descriptor are misdeclared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Configuration error: {message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The tag involved, if any.
    pub tag: Option<String>,
    /// Diagnostic details.
    pub error_info: ContractErrorInfo,
}

impl ConfigurationError {
    /// Error code for a tag referenced at runtime but never declared.
    pub const UNKNOWN_TAG: &'static str = "BRIDGE-001-UNKNOWN_TAG";
    /// Error code for a stage output with no declared tag.
    pub const UNDECLARED_OUTPUT: &'static str = "BRIDGE-002-UNDECLARED_OUTPUT";
    /// Error code for a tag with no usable codec.
    pub const MISSING_CODEC: &'static str = "BRIDGE-003-MISSING_CODEC";
    /// Error code for two tags routed to one channel.
    pub const DUPLICATE_CHANNEL: &'static str = "BRIDGE-004-DUPLICATE_CHANNEL";
    /// Error code for an invalid stage descriptor or operator spec.
    pub const INVALID_STAGE: &'static str = "BRIDGE-005-INVALID_STAGE";

    fn build(code: &str, message: String, tag: Option<String>, hint: &str) -> Self {
        let mut info = ContractErrorInfo::new(code, message.clone()).with_fix_hint(hint);
        if let Some(ref tag) = tag {
            info = info.with_context_entry("tag", tag.clone());
        }
        Self {
            message,
            tag,
            error_info: info,
        }
    }

    /// A tag was referenced that is not in the registry.
    #[must_use]
    pub fn unknown_tag(tag: impl Into<String>, known: &[String]) -> Self {
        let tag = tag.into();
        Self::build(
            Self::UNKNOWN_TAG,
            format!(
                "unknown output tag '{tag}' (declared tags: [{}])",
                known.join(", ")
            ),
            Some(tag),
            "Declare every tag the stage emits to before starting the operator.",
        )
    }

    /// The stage declares an output that no tag covers.
    #[must_use]
    pub fn undeclared_output(output_id: impl Into<String>) -> Self {
        let output_id = output_id.into();
        Self::build(
            Self::UNDECLARED_OUTPUT,
            format!("stage output '{output_id}' has no declared tag"),
            Some(output_id),
            "Add the output id as the main tag or as an additional tag.",
        )
    }

    /// A tag is declared without a usable codec.
    #[must_use]
    pub fn missing_codec(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self::build(
            Self::MISSING_CODEC,
            format!("tag '{tag}' has no codec"),
            Some(tag),
            "Declare a codec with a non-empty urn for every tag.",
        )
    }

    /// Two tags share a destination channel.
    #[must_use]
    pub fn duplicate_channel(tag: impl Into<String>, channel: impl fmt::Display) -> Self {
        let tag = tag.into();
        Self::build(
            Self::DUPLICATE_CHANNEL,
            format!("tag '{tag}' routes to channel '{channel}' which is already taken"),
            Some(tag),
            "Give every additional tag its own side channel.",
        )
    }

    /// The stage descriptor or operator spec is malformed.
    #[must_use]
    pub fn invalid_stage(message: impl Into<String>) -> Self {
        Self::build(
            Self::INVALID_STAGE,
            message.into(),
            None,
            "Check the compiled stage payload and the operator configuration.",
        )
    }

    /// Returns the error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.error_info.code
    }
}

/// The step of the bundle protocol during which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundlePhase {
    /// Obtaining a bundle from the factory.
    Open,
    /// Sending an element to the bundle's input.
    Send,
    /// Closing the bundle and flushing its outputs.
    Close,
    /// Forwarding a watermark to the host output.
    Watermark,
}

impl fmt::Display for BundlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Send => write!(f, "send"),
            Self::Close => write!(f, "close"),
            Self::Watermark => write!(f, "watermark"),
        }
    }
}

/// An executor-side failure, wrapping the original cause.
#[derive(Debug, Error)]
#[error("Bundle {phase} failed for bundle '{bundle_id}': {cause}")]
pub struct ExecutionError {
    /// Where in the protocol the failure happened.
    pub phase: BundlePhase,
    /// The bundle involved (empty when no bundle was obtained).
    pub bundle_id: String,
    #[source]
    cause: anyhow::Error,
}

impl ExecutionError {
    /// Wraps an executor-side failure.
    #[must_use]
    pub fn new(phase: BundlePhase, bundle_id: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            phase,
            bundle_id: bundle_id.into(),
            cause,
        }
    }

    /// Returns the original failure.
    #[must_use]
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }

    /// Consumes the error, returning the original failure.
    #[must_use]
    pub fn into_cause(self) -> anyhow::Error {
        self.cause
    }
}

/// Raised when releasing the bundle factory fails.
#[derive(Debug, Error)]
#[error("Failed to release bundle factory of step '{step_name}': {cause}")]
pub struct ResourceReleaseError {
    /// The operator step that owned the factory.
    pub step_name: String,
    #[source]
    cause: anyhow::Error,
}

impl ResourceReleaseError {
    /// Wraps a release failure.
    #[must_use]
    pub fn new(step_name: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            step_name: step_name.into(),
            cause,
        }
    }

    /// Returns the original failure.
    #[must_use]
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}
