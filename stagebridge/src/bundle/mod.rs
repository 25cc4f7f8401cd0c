//! Bundles and bundle factories.
//!
//! A bundle is one bounded execution unit on the executor: elements are sent
//! to its input receiver while it is open, and closing it flushes every
//! tagged result through the output receiver factory it was created with.

mod in_process;

pub use in_process::{InProcessBundle, InProcessBundleFactory, StageFn};

use crate::context::{BundleProgressHandler, StateRequestHandler};
use crate::core::WindowedValue;
use crate::errors::ConfigurationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A sink accepting windowed values.
///
/// Used both for a bundle's input and for the per-tag output receivers.
/// `accept` may suspend while the receiving side applies backpressure.
#[async_trait]
pub trait DataReceiver<T>: Send + Sync {
    /// Accepts one value.
    async fn accept(&self, value: WindowedValue<T>) -> anyhow::Result<()>;
}

/// Maps a tag id to the receiver of that tag's destination channel.
pub trait OutputReceiverFactory<O>: Send + Sync {
    /// Returns the receiver for the tag.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the tag was never declared.
    fn create(&self, tag: &str) -> Result<Arc<dyn DataReceiver<O>>, ConfigurationError>;
}

/// An open execution unit on the executor.
#[async_trait]
pub trait RemoteBundle<I>: Send {
    /// Returns the executor-assigned bundle id.
    fn id(&self) -> &str;

    /// Returns the receiver elements are sent to while the bundle is open.
    fn input_receiver(&self) -> Arc<dyn DataReceiver<I>>;

    /// Closes the bundle.
    ///
    /// Every output produced for elements sent so far has been delivered
    /// through the output receiver factory when this returns `Ok`.
    /// Dropping a bundle without closing it abandons it.
    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}

/// Produces bundles bound to one stage, job and environment.
#[async_trait]
pub trait StageBundleFactory<I, O>: Send + Sync {
    /// Opens a new bundle.
    async fn get_bundle(
        &self,
        outputs: Arc<dyn OutputReceiverFactory<O>>,
        state_handler: Arc<dyn StateRequestHandler>,
        progress_handler: Arc<dyn BundleProgressHandler>,
    ) -> anyhow::Result<Box<dyn RemoteBundle<I>>>;

    /// Releases the factory and everything it pooled.
    async fn close(&self) -> anyhow::Result<()>;
}

/// Lifecycle state of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleState {
    /// Accepting elements.
    Open,
    /// Closed and fully flushed.
    Closed,
    /// A send or close failed.
    Failed,
}

impl BundleState {
    /// Returns true if the bundle can no longer accept input.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for BundleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
