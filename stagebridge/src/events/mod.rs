//! Operator lifecycle events.
//!
//! The operator reports bundle and lifecycle transitions to an
//! [`EventSink`]. Payloads are JSON objects that always carry the step name
//! and the operator instance id.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of event the operator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorEvent {
    /// The operator built its router and bundle factory.
    #[serde(rename = "operator.opened")]
    Opened,
    /// A bundle was opened on the executor.
    #[serde(rename = "bundle.opened")]
    BundleOpened,
    /// A bundle closed and all of its outputs were routed.
    #[serde(rename = "bundle.closed")]
    BundleClosed,
    /// A send or close failed.
    #[serde(rename = "bundle.failed")]
    BundleFailed,
    /// A checkpoint barrier completed.
    #[serde(rename = "operator.checkpoint")]
    Checkpoint,
    /// The operator released its bundle factory.
    #[serde(rename = "operator.disposed")]
    Disposed,
}

impl OperatorEvent {
    /// Returns the event type string passed to the sink.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opened => "operator.opened",
            Self::BundleOpened => "bundle.opened",
            Self::BundleClosed => "bundle.closed",
            Self::BundleFailed => "bundle.failed",
            Self::Checkpoint => "operator.checkpoint",
            Self::Disposed => "operator.disposed",
        }
    }
}

impl fmt::Display for OperatorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_match_serde() {
        for event in [
            OperatorEvent::Opened,
            OperatorEvent::BundleOpened,
            OperatorEvent::BundleClosed,
            OperatorEvent::BundleFailed,
            OperatorEvent::Checkpoint,
            OperatorEvent::Disposed,
        ] {
            let json = serde_json::to_string(&event).unwrap();
            assert_eq!(json, format!("\"{}\"", event.as_str()));
        }
    }
}
