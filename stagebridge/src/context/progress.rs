//! Bundle progress reporting.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Progress of one bundle as reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BundleProgress {
    /// The bundle reporting.
    pub bundle_id: String,
    /// Elements consumed so far.
    pub elements_processed: u64,
    /// Results produced so far.
    pub outputs_produced: u64,
}

/// Receives progress updates while a bundle runs.
pub trait BundleProgressHandler: Send + Sync {
    /// Called with intermediate progress.
    fn on_progress(&self, progress: &BundleProgress);

    /// Called once the bundle completed.
    fn on_completed(&self, progress: &BundleProgress);
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressHandler;

impl BundleProgressHandler for NoOpProgressHandler {
    fn on_progress(&self, _progress: &BundleProgress) {}
    fn on_completed(&self, _progress: &BundleProgress) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LoggingProgressHandler {
    step_name: String,
}

impl LoggingProgressHandler {
    /// Creates a handler labelling its records with the step name.
    #[must_use]
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
        }
    }
}

impl BundleProgressHandler for LoggingProgressHandler {
    fn on_progress(&self, progress: &BundleProgress) {
        debug!(
            step = %self.step_name,
            bundle_id = %progress.bundle_id,
            elements = progress.elements_processed,
            outputs = progress.outputs_produced,
            "Bundle progress"
        );
    }

    fn on_completed(&self, progress: &BundleProgress) {
        info!(
            step = %self.step_name,
            bundle_id = %progress.bundle_id,
            elements = progress.elements_processed,
            outputs = progress.outputs_produced,
            "Bundle completed"
        );
    }
}
