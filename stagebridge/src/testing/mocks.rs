//! Test doubles for the executor, the environment and the host output.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::bundle::{DataReceiver, OutputReceiverFactory, RemoteBundle, StageBundleFactory};
use crate::context::{
    BundleProgressHandler, ExecutionEnvironment, HandlerScope, NoOpProgressHandler,
    StateRequestHandler, UnsupportedStateHandler,
};
use crate::core::{JobInfo, OutputChannel, StageDescriptor, WindowedValue};
use crate::router::OutputCollector;

struct ScriptState<I, O> {
    received: Mutex<Vec<WindowedValue<I>>>,
    script: Mutex<Vec<(String, WindowedValue<O>)>>,
    close_failures: Mutex<VecDeque<anyhow::Error>>,
    release_failure: Mutex<Option<anyhow::Error>>,
    interactions: Mutex<Vec<String>>,
    state_handlers: Mutex<Vec<Arc<dyn StateRequestHandler>>>,
    fail_sends: AtomicBool,
    hang_next_send: AtomicBool,
    hang_next_close: AtomicBool,
    bundles_opened: AtomicU64,
    bundles_closed: AtomicU64,
    releases: AtomicU64,
}

impl<I, O> ScriptState<I, O> {
    fn record(&self, interaction: impl Into<String>) {
        self.interactions.lock().push(interaction.into());
    }
}

/// A bundle factory whose bundles record their input and replay a script of
/// tagged results on close.
///
/// Clones share state, so a test can keep one clone while the operator owns
/// another.
pub struct ScriptedBundleFactory<I, O> {
    state: Arc<ScriptState<I, O>>,
}

impl<I, O> Clone for ScriptedBundleFactory<I, O> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<I, O> Default for ScriptedBundleFactory<I, O> {
    fn default() -> Self {
        Self {
            state: Arc::new(ScriptState {
                received: Mutex::new(Vec::new()),
                script: Mutex::new(Vec::new()),
                close_failures: Mutex::new(VecDeque::new()),
                release_failure: Mutex::new(None),
                interactions: Mutex::new(Vec::new()),
                state_handlers: Mutex::new(Vec::new()),
                fail_sends: AtomicBool::new(false),
                hang_next_send: AtomicBool::new(false),
                hang_next_close: AtomicBool::new(false),
                bundles_opened: AtomicU64::new(0),
                bundles_closed: AtomicU64::new(0),
                releases: AtomicU64::new(0),
            }),
        }
    }
}

impl<I, O> ScriptedBundleFactory<I, O> {
    /// Creates a factory whose bundles produce nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a result every bundle emits on close.
    #[must_use]
    pub fn emitting(self, tag: impl Into<String>, value: WindowedValue<O>) -> Self {
        self.state.script.lock().push((tag.into(), value));
        self
    }

    /// Makes the next bundle close fail with `error` after emitting its script.
    pub fn fail_next_close(&self, error: anyhow::Error) {
        self.state.close_failures.lock().push_back(error);
    }

    /// Makes every send fail.
    pub fn fail_sends(&self) {
        self.state.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Makes the next send never complete.
    pub fn hang_next_send(&self) {
        self.state.hang_next_send.store(true, Ordering::SeqCst);
    }

    /// Makes the next bundle close never complete.
    pub fn hang_next_close(&self) {
        self.state.hang_next_close.store(true, Ordering::SeqCst);
    }

    /// Makes the factory release fail with `error`.
    pub fn fail_release(&self, error: anyhow::Error) {
        *self.state.release_failure.lock() = Some(error);
    }

    /// Returns the number of bundles opened.
    #[must_use]
    pub fn bundles_opened(&self) -> u64 {
        self.state.bundles_opened.load(Ordering::SeqCst)
    }

    /// Returns the number of bundles closed successfully.
    #[must_use]
    pub fn bundles_closed(&self) -> u64 {
        self.state.bundles_closed.load(Ordering::SeqCst)
    }

    /// Returns how often the factory was released.
    #[must_use]
    pub fn releases(&self) -> u64 {
        self.state.releases.load(Ordering::SeqCst)
    }

    /// Returns every call made on the factory and its bundles, in order.
    #[must_use]
    pub fn interactions(&self) -> Vec<String> {
        self.state.interactions.lock().clone()
    }

    /// Returns the state handlers passed to `get_bundle`, in order.
    #[must_use]
    pub fn state_handlers(&self) -> Vec<Arc<dyn StateRequestHandler>> {
        self.state.state_handlers.lock().clone()
    }
}

impl<I: Clone, O> ScriptedBundleFactory<I, O> {
    /// Returns the payloads of every element sent to any bundle, in order.
    #[must_use]
    pub fn received_values(&self) -> Vec<I> {
        self.state
            .received
            .lock()
            .iter()
            .map(|wv| wv.value.clone())
            .collect()
    }
}

#[async_trait]
impl<I, O> StageBundleFactory<I, O> for ScriptedBundleFactory<I, O>
where
    I: Send + 'static,
    O: Clone + Send + 'static,
{
    async fn get_bundle(
        &self,
        outputs: Arc<dyn OutputReceiverFactory<O>>,
        state_handler: Arc<dyn StateRequestHandler>,
        _progress_handler: Arc<dyn BundleProgressHandler>,
    ) -> anyhow::Result<Box<dyn RemoteBundle<I>>> {
        if self.releases() > 0 {
            anyhow::bail!("scripted factory used after release");
        }
        let n = self.state.bundles_opened.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("scripted-{n}");
        self.state.record(format!("get_bundle:{id}"));
        self.state.state_handlers.lock().push(state_handler);

        Ok(Box::new(ScriptedBundle {
            id,
            input: Arc::new(ScriptedInput {
                state: self.state.clone(),
            }),
            outputs,
            state: self.state.clone(),
        }))
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.state.record("release");
        self.state.releases.fetch_add(1, Ordering::SeqCst);
        let failure = self.state.release_failure.lock().take();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

struct ScriptedInput<I, O> {
    state: Arc<ScriptState<I, O>>,
}

#[async_trait]
impl<I, O> DataReceiver<I> for ScriptedInput<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn accept(&self, value: WindowedValue<I>) -> anyhow::Result<()> {
        if self.state.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("executor rejected element");
        }
        if self.state.hang_next_send.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.state.received.lock().push(value);
        Ok(())
    }
}

struct ScriptedBundle<I, O> {
    id: String,
    input: Arc<ScriptedInput<I, O>>,
    outputs: Arc<dyn OutputReceiverFactory<O>>,
    state: Arc<ScriptState<I, O>>,
}

#[async_trait]
impl<I, O> RemoteBundle<I> for ScriptedBundle<I, O>
where
    I: Send + 'static,
    O: Clone + Send + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn input_receiver(&self) -> Arc<dyn DataReceiver<I>> {
        self.input.clone()
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.state.record(format!("close:{}", self.id));
        if self.state.hang_next_close.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let script = self.state.script.lock().clone();
        for (tag, value) in script {
            self.outputs.create(&tag)?.accept(value).await?;
        }

        let failure = self.state.close_failures.lock().pop_front();
        if let Some(err) = failure {
            return Err(err);
        }
        self.state.bundles_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

type FactoryFn<I, O> = dyn Fn() -> Box<dyn StageBundleFactory<I, O>> + Send + Sync;

/// An environment handing out a fixed factory and state handler.
pub struct StaticEnvironment<I, O> {
    factory: Arc<FactoryFn<I, O>>,
    state_handler: Arc<dyn StateRequestHandler>,
    progress_handler: Arc<dyn BundleProgressHandler>,
    scopes: Mutex<Vec<HandlerScope>>,
    factories_created: AtomicU64,
}

impl<I, O> StaticEnvironment<I, O> {
    /// Creates an environment returning clones of `factory`.
    #[must_use]
    pub fn new<F>(factory: F) -> Self
    where
        F: StageBundleFactory<I, O> + Clone + 'static,
    {
        Self::from_fn(move || -> Box<dyn StageBundleFactory<I, O>> { Box::new(factory.clone()) })
    }

    /// Creates an environment building a factory with `make`.
    #[must_use]
    pub fn from_fn<F>(make: F) -> Self
    where
        F: Fn() -> Box<dyn StageBundleFactory<I, O>> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(make),
            state_handler: Arc::new(UnsupportedStateHandler),
            progress_handler: Arc::new(NoOpProgressHandler),
            scopes: Mutex::new(Vec::new()),
            factories_created: AtomicU64::new(0),
        }
    }

    /// Sets the state handler returned for every bundle.
    #[must_use]
    pub fn with_state_handler(mut self, handler: Arc<dyn StateRequestHandler>) -> Self {
        self.state_handler = handler;
        self
    }

    /// Sets the progress handler returned for every bundle.
    #[must_use]
    pub fn with_progress_handler(mut self, handler: Arc<dyn BundleProgressHandler>) -> Self {
        self.progress_handler = handler;
        self
    }

    /// Returns the scopes state handlers were requested for.
    #[must_use]
    pub fn scopes(&self) -> Vec<HandlerScope> {
        self.scopes.lock().clone()
    }

    /// Returns the number of factories handed out.
    #[must_use]
    pub fn factories_created(&self) -> u64 {
        self.factories_created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<I, O> ExecutionEnvironment<I, O> for StaticEnvironment<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn bundle_factory(
        &self,
        _descriptor: &StageDescriptor,
        _job_info: &JobInfo,
    ) -> anyhow::Result<Box<dyn StageBundleFactory<I, O>>> {
        self.factories_created.fetch_add(1, Ordering::SeqCst);
        Ok((self.factory)())
    }

    fn state_request_handler(
        &self,
        _descriptor: &StageDescriptor,
        scope: &HandlerScope,
    ) -> Arc<dyn StateRequestHandler> {
        self.scopes.lock().push(scope.clone());
        self.state_handler.clone()
    }

    fn progress_handler(&self, _scope: &HandlerScope) -> Arc<dyn BundleProgressHandler> {
        self.progress_handler.clone()
    }
}

/// Something the host output received.
#[derive(Debug, Clone, PartialEq)]
pub enum Emitted<O> {
    /// A value on a channel.
    Value(OutputChannel, WindowedValue<O>),
    /// A forwarded watermark.
    Watermark(DateTime<Utc>),
}

/// A host output that keeps everything it receives, in arrival order.
pub struct CollectingOutput<O> {
    log: Mutex<Vec<Emitted<O>>>,
    fail_watermarks: AtomicBool,
}

impl<O> Default for CollectingOutput<O> {
    fn default() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            fail_watermarks: AtomicBool::new(false),
        }
    }
}

impl<O> CollectingOutput<O> {
    /// Creates an empty output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes watermark forwarding fail.
    pub fn fail_watermarks(&self) {
        self.fail_watermarks.store(true, Ordering::SeqCst);
    }

    /// Returns the number of values and watermarks received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Returns true if nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    /// Returns the forwarded watermarks.
    #[must_use]
    pub fn watermarks(&self) -> Vec<DateTime<Utc>> {
        self.log
            .lock()
            .iter()
            .filter_map(|e| match e {
                Emitted::Watermark(w) => Some(*w),
                Emitted::Value(..) => None,
            })
            .collect()
    }
}

impl<O: Clone> CollectingOutput<O> {
    /// Returns everything received, in order.
    #[must_use]
    pub fn log(&self) -> Vec<Emitted<O>> {
        self.log.lock().clone()
    }

    /// Returns the payloads received on a channel.
    #[must_use]
    pub fn values_on(&self, channel: &OutputChannel) -> Vec<O> {
        self.log
            .lock()
            .iter()
            .filter_map(|e| match e {
                Emitted::Value(c, wv) if c == channel => Some(wv.value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the payloads received on the main channel.
    #[must_use]
    pub fn main_values(&self) -> Vec<O> {
        self.values_on(&OutputChannel::Main)
    }

    /// Returns the payloads received on a side channel.
    #[must_use]
    pub fn side_values(&self, channel_id: &str) -> Vec<O> {
        self.log
            .lock()
            .iter()
            .filter_map(|e| match e {
                Emitted::Value(OutputChannel::Side(id), wv) if id.as_str() == channel_id => {
                    Some(wv.value.clone())
                }
                _ => None,
            })
            .collect()
    }
}

impl<O: Send> OutputCollector<O> for CollectingOutput<O> {
    fn emit(&self, channel: &OutputChannel, value: WindowedValue<O>) -> anyhow::Result<()> {
        self.log.lock().push(Emitted::Value(channel.clone(), value));
        Ok(())
    }

    fn emit_watermark(&self, watermark: DateTime<Utc>) -> anyhow::Result<()> {
        if self.fail_watermarks.load(Ordering::SeqCst) {
            anyhow::bail!("downstream closed");
        }
        self.log.lock().push(Emitted::Watermark(watermark));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChannelId;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collecting_output_splits_channels() {
        let output = CollectingOutput::<i32>::new();
        output
            .emit(&OutputChannel::Main, WindowedValue::in_global_window(1))
            .unwrap();
        output
            .emit(
                &OutputChannel::Side(ChannelId::new("s")),
                WindowedValue::in_global_window(2),
            )
            .unwrap();
        output.emit_watermark(Utc::now()).unwrap();

        assert_eq!(output.main_values(), vec![1]);
        assert_eq!(output.side_values("s"), vec![2]);
        assert_eq!(output.watermarks().len(), 1);
        assert_eq!(output.len(), 3);
    }

    #[test]
    fn test_failing_watermarks() {
        let output = CollectingOutput::<i32>::new();
        output.fail_watermarks();
        assert!(output.emit_watermark(Utc::now()).is_err());
        assert!(output.is_empty());
    }
}
