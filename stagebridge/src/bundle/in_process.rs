//! An executor backend that runs the stage fragment in the bridge's process.

use super::{DataReceiver, OutputReceiverFactory, RemoteBundle, StageBundleFactory};
use crate::context::{BundleProgress, BundleProgressHandler, StateRequestHandler};
use crate::core::{Tag, WindowedValue};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// The stage fragment: one input element to zero or more tagged results.
pub type StageFn<I, O> =
    Arc<dyn Fn(WindowedValue<I>) -> anyhow::Result<Vec<(Tag, WindowedValue<O>)>> + Send + Sync>;

/// Bundle factory running a Rust closure as the stage.
///
/// Results are buffered per bundle and delivered on close, the same way a
/// remote executor may hold them back until the bundle finishes.
pub struct InProcessBundleFactory<I, O> {
    stage: StageFn<I, O>,
    next_bundle: AtomicU64,
    released: AtomicBool,
}

impl<I, O> InProcessBundleFactory<I, O> {
    /// Creates a factory for the given stage fragment.
    pub fn new<F>(stage: F) -> Self
    where
        F: Fn(WindowedValue<I>) -> anyhow::Result<Vec<(Tag, WindowedValue<O>)>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            stage: Arc::new(stage),
            next_bundle: AtomicU64::new(0),
            released: AtomicBool::new(false),
        }
    }

    /// Returns the number of bundles opened so far.
    #[must_use]
    pub fn bundles_created(&self) -> u64 {
        self.next_bundle.load(Ordering::SeqCst)
    }

    /// Returns true once the factory has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl<I, O> fmt::Debug for InProcessBundleFactory<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessBundleFactory")
            .field("bundles_created", &self.bundles_created())
            .field("released", &self.is_released())
            .finish()
    }
}

#[async_trait]
impl<I, O> StageBundleFactory<I, O> for InProcessBundleFactory<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn get_bundle(
        &self,
        outputs: Arc<dyn OutputReceiverFactory<O>>,
        state_handler: Arc<dyn StateRequestHandler>,
        progress_handler: Arc<dyn BundleProgressHandler>,
    ) -> anyhow::Result<Box<dyn RemoteBundle<I>>> {
        if self.is_released() {
            bail!("in-process bundle factory used after release");
        }
        let n = self.next_bundle.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("in-process-{n}");
        debug!(bundle_id = %id, "Opening in-process bundle");

        Ok(Box::new(InProcessBundle {
            input: Arc::new(InProcessInput {
                bundle_id: id.clone(),
                stage: self.stage.clone(),
                buffered: Mutex::new(Vec::new()),
                elements: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                progress_handler: progress_handler.clone(),
            }),
            id,
            outputs,
            state_handler,
            progress_handler,
        }))
    }

    async fn close(&self) -> anyhow::Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            bail!("in-process bundle factory released twice");
        }
        Ok(())
    }
}

struct InProcessInput<I, O> {
    bundle_id: String,
    stage: StageFn<I, O>,
    buffered: Mutex<Vec<(Tag, WindowedValue<O>)>>,
    elements: AtomicU64,
    closed: AtomicBool,
    progress_handler: Arc<dyn BundleProgressHandler>,
}

#[async_trait]
impl<I, O> DataReceiver<I> for InProcessInput<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn accept(&self, value: WindowedValue<I>) -> anyhow::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("element sent to a closed bundle");
        }
        let results = (self.stage)(value)?;
        let elements_processed = self.elements.fetch_add(1, Ordering::Relaxed) + 1;
        let outputs_produced = {
            let mut buffered = self.buffered.lock();
            buffered.extend(results);
            buffered.len() as u64
        };
        self.progress_handler.on_progress(&BundleProgress {
            bundle_id: self.bundle_id.clone(),
            elements_processed,
            outputs_produced,
        });
        Ok(())
    }
}

/// A bundle of the in-process backend.
pub struct InProcessBundle<I, O> {
    id: String,
    input: Arc<InProcessInput<I, O>>,
    outputs: Arc<dyn OutputReceiverFactory<O>>,
    state_handler: Arc<dyn StateRequestHandler>,
    progress_handler: Arc<dyn BundleProgressHandler>,
}

impl<I, O> InProcessBundle<I, O> {
    /// Returns the state handler the bundle was opened with.
    #[must_use]
    pub fn state_handler(&self) -> &Arc<dyn StateRequestHandler> {
        &self.state_handler
    }
}

#[async_trait]
impl<I, O> RemoteBundle<I> for InProcessBundle<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn input_receiver(&self) -> Arc<dyn DataReceiver<I>> {
        self.input.clone()
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        if self.input.closed.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("bundle '{}' closed twice", self.id));
        }
        let results = std::mem::take(&mut *self.input.buffered.lock());
        let produced = results.len() as u64;

        let mut receivers: HashMap<Tag, Arc<dyn DataReceiver<O>>> = HashMap::new();
        for (tag, value) in results {
            let receiver = match receivers.get(&tag) {
                Some(receiver) => receiver.clone(),
                None => {
                    let receiver = self.outputs.create(tag.id())?;
                    receivers.insert(tag, receiver.clone());
                    receiver
                }
            };
            receiver.accept(value).await?;
        }

        self.progress_handler.on_completed(&BundleProgress {
            bundle_id: self.id.clone(),
            elements_processed: self.input.elements.load(Ordering::Relaxed),
            outputs_produced: produced,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{NoOpProgressHandler, UnsupportedStateHandler};
    use crate::errors::ConfigurationError;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, i64)>>,
    }

    struct TagReceiver {
        tag: String,
        recorder: Arc<Recorder>,
    }

    #[async_trait]
    impl DataReceiver<i64> for TagReceiver {
        async fn accept(&self, value: WindowedValue<i64>) -> anyhow::Result<()> {
            self.recorder.seen.lock().push((self.tag.clone(), value.value));
            Ok(())
        }
    }

    struct RecordingOutputs {
        known: Vec<String>,
        recorder: Arc<Recorder>,
    }

    impl OutputReceiverFactory<i64> for RecordingOutputs {
        fn create(&self, tag: &str) -> Result<Arc<dyn DataReceiver<i64>>, ConfigurationError> {
            if !self.known.iter().any(|t| t == tag) {
                return Err(ConfigurationError::unknown_tag(tag, &self.known));
            }
            Ok(Arc::new(TagReceiver {
                tag: tag.to_string(),
                recorder: self.recorder.clone(),
            }))
        }
    }

    fn outputs(recorder: &Arc<Recorder>) -> Arc<dyn OutputReceiverFactory<i64>> {
        Arc::new(RecordingOutputs {
            known: vec!["main".to_string(), "odd".to_string()],
            recorder: recorder.clone(),
        })
    }

    fn splitter() -> InProcessBundleFactory<i64, i64> {
        InProcessBundleFactory::new(|wv: WindowedValue<i64>| {
            let tag = if wv.value % 2 == 0 { "main" } else { "odd" };
            let doubled = wv.value * 2;
            Ok(vec![(Tag::new(tag), wv.with_value(doubled))])
        })
    }

    #[tokio::test]
    async fn test_outputs_deferred_until_close() {
        let recorder = Arc::new(Recorder::default());
        let factory = splitter();
        let bundle = factory
            .get_bundle(
                outputs(&recorder),
                Arc::new(UnsupportedStateHandler),
                Arc::new(NoOpProgressHandler),
            )
            .await
            .unwrap();

        let input = bundle.input_receiver();
        for v in 1..=4 {
            input.accept(WindowedValue::in_global_window(v)).await.unwrap();
        }
        assert!(recorder.seen.lock().is_empty());

        bundle.close().await.unwrap();
        assert_eq!(
            *recorder.seen.lock(),
            vec![
                ("odd".to_string(), 2),
                ("main".to_string(), 4),
                ("odd".to_string(), 6),
                ("main".to_string(), 8),
            ]
        );
    }

    #[derive(Default)]
    struct RecordingProgress {
        updates: Mutex<Vec<BundleProgress>>,
        completed: Mutex<Vec<BundleProgress>>,
    }

    impl BundleProgressHandler for RecordingProgress {
        fn on_progress(&self, progress: &BundleProgress) {
            self.updates.lock().push(progress.clone());
        }

        fn on_completed(&self, progress: &BundleProgress) {
            self.completed.lock().push(progress.clone());
        }
    }

    #[tokio::test]
    async fn test_progress_reported_per_element() {
        let recorder = Arc::new(Recorder::default());
        let progress = Arc::new(RecordingProgress::default());
        let factory: InProcessBundleFactory<i64, i64> = InProcessBundleFactory::new(|wv| {
            if wv.value == 2 {
                Ok(Vec::new())
            } else {
                Ok(vec![(Tag::new("main"), wv)])
            }
        });
        let bundle = factory
            .get_bundle(outputs(&recorder), Arc::new(UnsupportedStateHandler), progress.clone())
            .await
            .unwrap();

        let input = bundle.input_receiver();
        for v in 1..=3 {
            input.accept(WindowedValue::in_global_window(v)).await.unwrap();
        }
        bundle.close().await.unwrap();

        let seen: Vec<(u64, u64)> = progress
            .updates
            .lock()
            .iter()
            .map(|p| (p.elements_processed, p.outputs_produced))
            .collect();
        assert_eq!(seen, vec![(1, 1), (2, 1), (3, 2)]);
        assert!(progress.updates.lock().iter().all(|p| p.bundle_id == "in-process-1"));

        let completed = progress.completed.lock();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].elements_processed, 3);
        assert_eq!(completed[0].outputs_produced, 2);
    }

    #[tokio::test]
    async fn test_unknown_tag_fails_close() {
        let recorder = Arc::new(Recorder::default());
        let factory: InProcessBundleFactory<i64, i64> = InProcessBundleFactory::new(|wv| {
            Ok(vec![(Tag::new("ghost"), wv)])
        });
        let bundle = factory
            .get_bundle(
                outputs(&recorder),
                Arc::new(UnsupportedStateHandler),
                Arc::new(NoOpProgressHandler),
            )
            .await
            .unwrap();
        bundle
            .input_receiver()
            .accept(WindowedValue::in_global_window(1))
            .await
            .unwrap();

        let err = bundle.close().await.unwrap_err();
        let config = err.downcast_ref::<ConfigurationError>().unwrap();
        assert_eq!(config.tag.as_deref(), Some("ghost"));
    }

    #[tokio::test]
    async fn test_send_after_close_rejected() {
        let recorder = Arc::new(Recorder::default());
        let factory = splitter();
        let bundle = factory
            .get_bundle(
                outputs(&recorder),
                Arc::new(UnsupportedStateHandler),
                Arc::new(NoOpProgressHandler),
            )
            .await
            .unwrap();
        let input = bundle.input_receiver();
        bundle.close().await.unwrap();
        assert!(input.accept(WindowedValue::in_global_window(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_factory_release() {
        let recorder = Arc::new(Recorder::default());
        let factory = splitter();
        factory.close().await.unwrap();
        assert!(factory.is_released());
        assert!(factory.close().await.is_err());

        let result = factory
            .get_bundle(
                outputs(&recorder),
                Arc::new(UnsupportedStateHandler),
                Arc::new(NoOpProgressHandler),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(factory.bundles_created(), 0);
    }
}
