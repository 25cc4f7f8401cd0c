//! Host output channels.

use crate::core::{OutputChannel, WindowedValue};
use chrono::{DateTime, Utc};

/// The host engine's output side, as seen by the operator.
pub trait OutputCollector<O>: Send + Sync {
    /// Appends a value to a channel.
    fn emit(&self, channel: &OutputChannel, value: WindowedValue<O>) -> anyhow::Result<()>;

    /// Forwards a watermark downstream.
    fn emit_watermark(&self, watermark: DateTime<Utc>) -> anyhow::Result<()>;
}
