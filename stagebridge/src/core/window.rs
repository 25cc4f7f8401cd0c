//! Windowed values exchanged on every channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A window an element has been assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoundedWindow {
    /// The single window spanning all time.
    Global,
    /// A half-open time interval `[start, end)`.
    Interval {
        /// Inclusive start.
        start: DateTime<Utc>,
        /// Exclusive end.
        end: DateTime<Utc>,
    },
}

impl BoundedWindow {
    /// Returns the last timestamp that belongs to the window.
    #[must_use]
    pub fn max_timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Global => DateTime::<Utc>::MAX_UTC,
            Self::Interval { end, .. } => *end - chrono::Duration::milliseconds(1),
        }
    }
}

/// When a pane fired relative to the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaneTiming {
    /// Fired before the watermark passed the window end.
    Early,
    /// Fired when the watermark passed the window end.
    OnTime,
    /// Fired after the watermark passed the window end.
    Late,
    /// No trigger information.
    #[default]
    Unknown,
}

/// Pane metadata attached by the trigger engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaneInfo {
    /// Zero-based index of the pane within its window.
    pub index: u64,
    /// Whether this is the first pane.
    pub is_first: bool,
    /// Whether this is the last pane.
    pub is_last: bool,
    /// Pane timing.
    pub timing: PaneTiming,
}

impl PaneInfo {
    /// The pane of an element that was never triggered.
    pub const NO_FIRING: Self = Self {
        index: 0,
        is_first: true,
        is_last: true,
        timing: PaneTiming::Unknown,
    };
}

impl Default for PaneInfo {
    fn default() -> Self {
        Self::NO_FIRING
    }
}

/// A value annotated with its timestamp, windows and pane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowedValue<T> {
    /// The payload.
    pub value: T,
    /// Event timestamp.
    pub timestamp: DateTime<Utc>,
    /// Assigned windows.
    pub windows: Vec<BoundedWindow>,
    /// Pane metadata.
    pub pane: PaneInfo,
}

impl<T> WindowedValue<T> {
    /// Creates a windowed value with explicit metadata.
    pub fn new(
        value: T,
        timestamp: DateTime<Utc>,
        windows: Vec<BoundedWindow>,
        pane: PaneInfo,
    ) -> Self {
        Self {
            value,
            timestamp,
            windows,
            pane,
        }
    }

    /// Places a value in the global window at the epoch.
    pub fn in_global_window(value: T) -> Self {
        Self::new(
            value,
            DateTime::<Utc>::default(),
            vec![BoundedWindow::Global],
            PaneInfo::NO_FIRING,
        )
    }

    /// Places a value in the global window at the given timestamp.
    pub fn timestamped(value: T, timestamp: DateTime<Utc>) -> Self {
        Self::new(value, timestamp, vec![BoundedWindow::Global], PaneInfo::NO_FIRING)
    }

    /// Replaces the payload, keeping timestamp, windows and pane.
    pub fn with_value<U>(self, value: U) -> WindowedValue<U> {
        WindowedValue {
            value,
            timestamp: self.timestamp,
            windows: self.windows,
            pane: self.pane,
        }
    }

    /// Maps the payload, keeping timestamp, windows and pane.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> WindowedValue<U> {
        WindowedValue {
            value: f(self.value),
            timestamp: self.timestamp,
            windows: self.windows,
            pane: self.pane,
        }
    }

    /// Returns true if the value is in the global window only.
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self.windows.as_slice(), [BoundedWindow::Global])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_in_global_window() {
        let wv = WindowedValue::in_global_window(7);
        assert!(wv.is_global());
        assert_eq!(wv.pane, PaneInfo::NO_FIRING);
        assert_eq!(wv.timestamp.timestamp(), 0);
    }

    #[test]
    fn test_map_keeps_metadata() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let wv = WindowedValue::timestamped(2, ts).map(|v| v * 10);
        assert_eq!(wv.value, 20);
        assert_eq!(wv.timestamp, ts);
        assert!(wv.is_global());
    }

    #[test]
    fn test_interval_max_timestamp() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap();
        let window = BoundedWindow::Interval { start, end };
        assert_eq!(window.max_timestamp(), end - chrono::Duration::milliseconds(1));
    }

    #[test]
    fn test_windowed_value_serialization() {
        let wv = WindowedValue::in_global_window("x".to_string());
        let json = serde_json::to_string(&wv).unwrap();
        let back: WindowedValue<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wv);
    }
}
