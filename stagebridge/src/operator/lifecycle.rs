//! Capabilities the hosting engine drives an operator through.

use crate::core::WindowedValue;
use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Start, end-of-input and teardown.
#[async_trait]
pub trait Lifecycle: Send {
    /// Prepares the operator for input. Idempotent.
    async fn open(&mut self) -> Result<()>;

    /// Flushes everything buffered at end of input.
    async fn close(&mut self) -> Result<()>;

    /// Releases every resource the operator owns.
    async fn dispose(&mut self) -> Result<()>;
}

/// Element and watermark input.
#[async_trait]
pub trait ElementConsumer<I>: Send {
    /// Processes one element.
    async fn process_element(&mut self, value: WindowedValue<I>) -> Result<()>;

    /// Advances the input watermark.
    async fn process_watermark(&mut self, watermark: DateTime<Utc>) -> Result<()>;
}

/// Participation in the host's checkpoint barrier.
#[async_trait]
pub trait Checkpointable: Send {
    /// Makes the operator's output consistent for checkpoint `checkpoint_id`.
    async fn checkpoint(&mut self, checkpoint_id: u64) -> Result<CheckpointReceipt>;
}

/// What an operator did at a checkpoint barrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointReceipt {
    /// The host's checkpoint id.
    pub checkpoint_id: u64,
    /// When the barrier completed.
    pub taken_at: DateTime<Utc>,
    /// The bundle closed by this barrier, if one was open.
    pub flushed_bundle: Option<String>,
}

impl CheckpointReceipt {
    /// Converts the receipt to a dictionary.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
