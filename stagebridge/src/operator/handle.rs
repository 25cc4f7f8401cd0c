//! The live, non-transferable half of an operator.

use crate::bundle::{DataReceiver, RemoteBundle, StageBundleFactory};
use crate::config::BundleConfig;
use crate::core::WindowedValue;
use crate::router::OutputRouter;
use std::sync::Arc;
use std::time::Instant;

/// Runtime resources rebuilt from the spec on first use.
pub(crate) struct OperatorHandle<I, O> {
    pub(crate) factory: Box<dyn StageBundleFactory<I, O>>,
    pub(crate) router: Arc<OutputRouter<O>>,
    pub(crate) active: Option<ActiveBundle<I>>,
}

impl<I, O> OperatorHandle<I, O> {
    pub(crate) fn new(factory: Box<dyn StageBundleFactory<I, O>>, router: OutputRouter<O>) -> Self {
        Self {
            factory,
            router: Arc::new(router),
            active: None,
        }
    }
}

/// The one bundle an operator may have open.
///
/// Dropping it without calling [`ActiveBundle::close`] abandons the bundle.
pub(crate) struct ActiveBundle<I> {
    bundle: Box<dyn RemoteBundle<I>>,
    input: Arc<dyn DataReceiver<I>>,
    id: String,
    sequence: u64,
    elements: u64,
    opened_at: Instant,
}

impl<I: Send + 'static> ActiveBundle<I> {
    pub(crate) fn new(bundle: Box<dyn RemoteBundle<I>>, sequence: u64) -> Self {
        let input = bundle.input_receiver();
        let id = bundle.id().to_string();
        Self {
            bundle,
            input,
            id,
            sequence,
            elements: 0,
            opened_at: Instant::now(),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn elements(&self) -> u64 {
        self.elements
    }

    /// True once either bound of `config` is reached.
    pub(crate) fn is_full(&self, config: &BundleConfig) -> bool {
        self.elements >= config.max_bundle_size
            || self.opened_at.elapsed() >= config.max_bundle_time()
    }

    pub(crate) async fn send(&mut self, value: WindowedValue<I>) -> anyhow::Result<()> {
        self.input.accept(value).await?;
        self.elements += 1;
        Ok(())
    }

    pub(crate) async fn close(self) -> anyhow::Result<()> {
        self.bundle.close().await
    }
}
