//! The host capability that supplies executor-facing resources.

use super::{BundleProgressHandler, NoOpProgressHandler, StateRequestHandler};
use crate::bundle::StageBundleFactory;
use crate::core::{JobInfo, StageDescriptor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a state handler is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerScope {
    /// Step name of the operator asking.
    pub step_name: String,
    /// Sequence number of the bundle within the operator's lifetime.
    pub bundle_sequence: u64,
    /// Number of checkpoints completed before the bundle opened.
    pub checkpoint_epoch: u64,
}

/// Host-supplied runtime resources, injected at operator construction.
///
/// The operator asks for one bundle factory per handle and one state
/// handler per bundle; it never reaches into the host any other way.
#[async_trait]
pub trait ExecutionEnvironment<I, O>: Send + Sync {
    /// Creates the bundle factory for a stage.
    async fn bundle_factory(
        &self,
        descriptor: &StageDescriptor,
        job_info: &JobInfo,
    ) -> anyhow::Result<Box<dyn StageBundleFactory<I, O>>>;

    /// Returns the state handler for one bundle.
    fn state_request_handler(
        &self,
        descriptor: &StageDescriptor,
        scope: &HandlerScope,
    ) -> Arc<dyn StateRequestHandler>;

    /// Returns the progress handler for one bundle.
    fn progress_handler(&self, _scope: &HandlerScope) -> Arc<dyn BundleProgressHandler> {
        Arc::new(NoOpProgressHandler)
    }
}
