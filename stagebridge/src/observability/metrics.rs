//! Per-operator bundle counters.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one operator instance.
#[derive(Debug, Default)]
pub struct BundleMetrics {
    bundles_opened: AtomicU64,
    bundles_closed: AtomicU64,
    bundles_failed: AtomicU64,
    elements_sent: AtomicU64,
    outputs_routed: AtomicU64,
    checkpoints: AtomicU64,
    per_tag: RwLock<HashMap<String, u64>>,
}

impl BundleMetrics {
    /// Records a bundle being opened.
    pub fn record_open(&self) {
        self.bundles_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a bundle closing cleanly.
    pub fn record_close(&self) {
        self.bundles_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a bundle failing.
    pub fn record_failure(&self) {
        self.bundles_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an element sent to a bundle.
    pub fn record_element(&self) {
        self.elements_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a completed checkpoint.
    pub fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a result routed for a tag.
    pub fn record_output(&self, tag: &str) {
        self.outputs_routed.fetch_add(1, Ordering::Relaxed);
        *self.per_tag.write().entry(tag.to_string()).or_insert(0) += 1;
    }

    /// Returns the number of bundles opened.
    #[must_use]
    pub fn bundles_opened(&self) -> u64 {
        self.bundles_opened.load(Ordering::Relaxed)
    }

    /// Returns the number of bundles closed cleanly.
    #[must_use]
    pub fn bundles_closed(&self) -> u64 {
        self.bundles_closed.load(Ordering::Relaxed)
    }

    /// Returns the number of failed bundles.
    #[must_use]
    pub fn bundles_failed(&self) -> u64 {
        self.bundles_failed.load(Ordering::Relaxed)
    }

    /// Returns the number of elements sent.
    #[must_use]
    pub fn elements_sent(&self) -> u64 {
        self.elements_sent.load(Ordering::Relaxed)
    }

    /// Returns the number of results routed.
    #[must_use]
    pub fn outputs_routed(&self) -> u64 {
        self.outputs_routed.load(Ordering::Relaxed)
    }

    /// Returns the number of completed checkpoints.
    #[must_use]
    pub fn checkpoints(&self) -> u64 {
        self.checkpoints.load(Ordering::Relaxed)
    }

    /// Returns the number of results routed for one tag.
    #[must_use]
    pub fn outputs_for_tag(&self, tag: &str) -> u64 {
        self.per_tag.read().get(tag).copied().unwrap_or(0)
    }

    /// Converts metrics to a dictionary.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "bundles_opened": self.bundles_opened(),
            "bundles_closed": self.bundles_closed(),
            "bundles_failed": self.bundles_failed(),
            "elements_sent": self.elements_sent(),
            "outputs_routed": self.outputs_routed(),
            "checkpoints": self.checkpoints(),
            "outputs_per_tag": *self.per_tag.read(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = BundleMetrics::default();
        metrics.record_open();
        metrics.record_element();
        metrics.record_element();
        metrics.record_output("main");
        metrics.record_output("side");
        metrics.record_output("side");
        metrics.record_close();

        assert_eq!(metrics.bundles_opened(), 1);
        assert_eq!(metrics.bundles_closed(), 1);
        assert_eq!(metrics.elements_sent(), 2);
        assert_eq!(metrics.outputs_routed(), 3);
        assert_eq!(metrics.outputs_for_tag("side"), 2);
        assert_eq!(metrics.outputs_for_tag("none"), 0);
    }

    #[test]
    fn test_to_dict() {
        let metrics = BundleMetrics::default();
        metrics.record_failure();
        metrics.record_output("main");
        let dict = metrics.to_dict();
        assert_eq!(dict["bundles_failed"], 1);
        assert_eq!(dict["outputs_per_tag"]["main"], 1);
    }
}
