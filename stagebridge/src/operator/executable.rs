//! The operator that runs a compiled stage through bundles.

use super::handle::{ActiveBundle, OperatorHandle};
use super::lifecycle::{CheckpointReceipt, Checkpointable, ElementConsumer, Lifecycle};
use super::spec::OperatorSpec;
use crate::bundle::{BundleState, OutputReceiverFactory};
use crate::context::{ExecutionEnvironment, HandlerScope};
use crate::core::WindowedValue;
use crate::errors::{BridgeError, BundlePhase, ConfigurationError, ExecutionError, ResourceReleaseError, Result};
use crate::events::{EventSink, NoOpEventSink, OperatorEvent};
use crate::observability::BundleMetrics;
use crate::router::{OutputCollector, OutputRouter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Runs a compiled stage on an executor, one bundle at a time.
///
/// Elements are sent to the open bundle as they arrive. A bundle is closed
/// when it reaches a configured bound, before a watermark is forwarded, at
/// every checkpoint, at end of input and at disposal. Closing a bundle is
/// what delivers its results to the host output, so results may arrive later
/// than the elements that produced them.
///
/// The operator is made of a serializable [`OperatorSpec`] and a live handle
/// (bundle factory, router, open bundle) that is built from the spec on
/// first use and never serialized.
pub struct ExecutionOperator<I, O> {
    instance_id: Uuid,
    spec: OperatorSpec,
    fingerprint: String,
    environment: Arc<dyn ExecutionEnvironment<I, O>>,
    output: Arc<dyn OutputCollector<O>>,
    events: Arc<dyn EventSink>,
    metrics: Arc<BundleMetrics>,
    handle: Option<OperatorHandle<I, O>>,
    bundle_sequence: u64,
    checkpoint_epoch: u64,
    last_bundle_state: Option<BundleState>,
    disposed: bool,
}

impl<I, O> ExecutionOperator<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Creates an operator.
    ///
    /// Nothing is requested from the environment until the operator is
    /// opened or receives its first element.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the spec is invalid.
    pub fn new(
        spec: OperatorSpec,
        environment: Arc<dyn ExecutionEnvironment<I, O>>,
        output: Arc<dyn OutputCollector<O>>,
    ) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            instance_id: Uuid::new_v4(),
            fingerprint: spec.descriptor.fingerprint(),
            spec,
            environment,
            output,
            events: Arc::new(NoOpEventSink),
            metrics: Arc::new(BundleMetrics::default()),
            handle: None,
            bundle_sequence: 0,
            checkpoint_epoch: 0,
            last_bundle_state: None,
            disposed: false,
        })
    }

    /// Reconstitutes an operator from bytes produced by [`Self::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed bytes and a
    /// configuration error if the decoded spec is invalid.
    pub fn from_bytes(
        bytes: &[u8],
        environment: Arc<dyn ExecutionEnvironment<I, O>>,
        output: Arc<dyn OutputCollector<O>>,
    ) -> Result<Self> {
        Self::new(OperatorSpec::from_bytes(bytes)?, environment, output)
    }

    /// Serializes the spec. Live state is never included.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.spec.to_bytes()
    }

    /// Creates a new, unopened instance with the same spec.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            spec: self.spec.clone(),
            fingerprint: self.fingerprint.clone(),
            environment: self.environment.clone(),
            output: self.output.clone(),
            events: self.events.clone(),
            metrics: Arc::new(BundleMetrics::default()),
            handle: None,
            bundle_sequence: 0,
            checkpoint_epoch: 0,
            last_bundle_state: None,
            disposed: false,
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Returns the id distinguishing this instance from its copies.
    #[must_use]
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Returns the spec.
    #[must_use]
    pub fn spec(&self) -> &OperatorSpec {
        &self.spec
    }

    /// Returns the step name.
    #[must_use]
    pub fn step_name(&self) -> &str {
        &self.spec.step_name
    }

    /// Returns this instance's counters.
    #[must_use]
    pub fn metrics(&self) -> &Arc<BundleMetrics> {
        &self.metrics
    }

    /// Returns true once the bundle factory has been created.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Returns true after [`Lifecycle::dispose`].
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Returns the id of the open bundle, if any.
    #[must_use]
    pub fn current_bundle_id(&self) -> Option<&str> {
        self.handle
            .as_ref()
            .and_then(|h| h.active.as_ref())
            .map(ActiveBundle::id)
    }

    /// Returns the state the most recent bundle ended in, or `Open`.
    #[must_use]
    pub fn last_bundle_state(&self) -> Option<BundleState> {
        if self.current_bundle_id().is_some() {
            Some(BundleState::Open)
        } else {
            self.last_bundle_state
        }
    }

    /// Returns the number of checkpoints completed by this instance.
    #[must_use]
    pub fn checkpoint_epoch(&self) -> u64 {
        self.checkpoint_epoch
    }

    fn ensure_live(&self, operation: &str) -> Result<()> {
        if self.disposed {
            return Err(BridgeError::IllegalState(format!(
                "{operation} called on disposed operator '{}'",
                self.spec.step_name
            )));
        }
        Ok(())
    }

    fn emit(&self, event: OperatorEvent, mut data: serde_json::Value) {
        if !self.spec.config.emit_events {
            return;
        }
        if let Some(fields) = data.as_object_mut() {
            fields.insert("step".to_string(), json!(self.spec.step_name));
            fields.insert("stage".to_string(), json!(self.fingerprint));
            fields.insert("instance_id".to_string(), json!(self.instance_id.to_string()));
        }
        self.events.try_emit(event.as_str(), Some(data));
    }

    async fn ensure_handle(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let router = OutputRouter::new(&self.spec.outputs, self.output.clone(), self.metrics.clone())?;
        let factory = self
            .environment
            .bundle_factory(&self.spec.descriptor, &self.spec.job_info)
            .await
            .map_err(|cause| ExecutionError::new(BundlePhase::Open, "", cause))?;
        let declared = router.declared_tags().to_vec();
        self.handle = Some(OperatorHandle::new(factory, router));

        info!(
            step = %self.spec.step_name,
            stage = %self.fingerprint,
            instance_id = %self.instance_id,
            job_id = %self.spec.job_info.job_id(),
            "Operator opened"
        );
        self.emit(OperatorEvent::Opened, json!({ "declared_tags": declared }));
        Ok(())
    }

    async fn open_bundle(&mut self) -> Result<()> {
        self.ensure_handle().await?;

        let sequence = self.bundle_sequence + 1;
        let scope = HandlerScope {
            step_name: self.spec.step_name.clone(),
            bundle_sequence: sequence,
            checkpoint_epoch: self.checkpoint_epoch,
        };
        let state_handler = self
            .environment
            .state_request_handler(&self.spec.descriptor, &scope);
        let progress_handler = self.environment.progress_handler(&scope);

        let Some(handle) = self.handle.as_mut() else {
            return Err(BridgeError::IllegalState("operator handle missing".to_string()));
        };
        let outputs: Arc<dyn OutputReceiverFactory<O>> = handle.router.clone();
        let bundle = match handle
            .factory
            .get_bundle(outputs, state_handler, progress_handler)
            .await
        {
            Ok(bundle) => bundle,
            Err(cause) => {
                self.metrics.record_failure();
                error!(step = %self.spec.step_name, error = %cause, "Failed to open bundle");
                return Err(ExecutionError::new(BundlePhase::Open, "", cause).into());
            }
        };

        let active = ActiveBundle::new(bundle, sequence);
        let bundle_id = active.id().to_string();
        handle.active = Some(active);
        self.bundle_sequence = sequence;
        self.metrics.record_open();

        debug!(step = %self.spec.step_name, bundle_id = %bundle_id, sequence, "Bundle opened");
        self.emit(
            OperatorEvent::BundleOpened,
            json!({ "bundle_id": bundle_id, "sequence": sequence, "checkpoint_epoch": self.checkpoint_epoch }),
        );
        Ok(())
    }

    fn record_failure(&mut self, bundle_id: &str, elements: u64, phase: BundlePhase, cause: &anyhow::Error) {
        self.last_bundle_state = Some(BundleState::Failed);
        self.metrics.record_failure();
        error!(
            step = %self.spec.step_name,
            bundle_id = %bundle_id,
            phase = %phase,
            elements,
            error = %cause,
            "Bundle failed"
        );
        self.emit(
            OperatorEvent::BundleFailed,
            json!({
                "bundle_id": bundle_id,
                "phase": phase,
                "elements": elements,
                "error": cause.to_string(),
            }),
        );
    }

    /// Drops a bundle whose send failed.
    fn abandon(&mut self, active: ActiveBundle<I>, cause: anyhow::Error) -> BridgeError {
        let bundle_id = active.id().to_string();
        let elements = active.elements();
        drop(active);
        self.record_failure(&bundle_id, elements, BundlePhase::Send, &cause);
        ExecutionError::new(BundlePhase::Send, bundle_id, cause).into()
    }

    /// Closes the open bundle, if any, returning its id.
    async fn close_active(&mut self) -> Result<Option<String>> {
        let Some(active) = self.handle.as_mut().and_then(|h| h.active.take()) else {
            return Ok(None);
        };
        let bundle_id = active.id().to_string();
        let elements = active.elements();
        let sequence = active.sequence();

        match active.close().await {
            Ok(()) => {
                self.last_bundle_state = Some(BundleState::Closed);
                self.metrics.record_close();
                debug!(step = %self.spec.step_name, bundle_id = %bundle_id, elements, "Bundle closed");
                self.emit(
                    OperatorEvent::BundleClosed,
                    json!({ "bundle_id": bundle_id, "sequence": sequence, "elements": elements }),
                );
                Ok(Some(bundle_id))
            }
            Err(cause) => {
                self.record_failure(&bundle_id, elements, BundlePhase::Close, &cause);
                let misconfigured = cause
                    .downcast_ref::<ConfigurationError>()
                    .or_else(|| cause.chain().find_map(|c| c.downcast_ref::<ConfigurationError>()))
                    .cloned();
                match misconfigured {
                    Some(config) => Err(config.into()),
                    None => Err(ExecutionError::new(BundlePhase::Close, bundle_id, cause).into()),
                }
            }
        }
    }
}

#[async_trait]
impl<I, O> Lifecycle for ExecutionOperator<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn open(&mut self) -> Result<()> {
        self.ensure_live("open")?;
        self.spec.validate()?;
        self.ensure_handle().await
    }

    async fn close(&mut self) -> Result<()> {
        self.ensure_live("close")?;
        if let Some(bundle_id) = self.close_active().await? {
            debug!(step = %self.spec.step_name, bundle_id = %bundle_id, "Flushed at end of input");
        }
        Ok(())
    }

    async fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            warn!(step = %self.spec.step_name, "Operator already disposed");
            return Ok(());
        }
        self.disposed = true;

        let closed = self.close_active().await;
        let released = match self.handle.take() {
            Some(handle) => handle
                .factory
                .close()
                .await
                .map_err(|cause| BridgeError::from(ResourceReleaseError::new(&self.spec.step_name, cause))),
            None => Ok(()),
        };

        let result = match (closed, released) {
            (Err(first), Err(second)) => {
                warn!(
                    step = %self.spec.step_name,
                    error = %second,
                    "Bundle factory release also failed"
                );
                Err(first)
            }
            (Err(err), Ok(())) | (Ok(_), Err(err)) => Err(err),
            (Ok(_), Ok(())) => Ok(()),
        };

        info!(
            step = %self.spec.step_name,
            instance_id = %self.instance_id,
            bundles = self.bundle_sequence,
            clean = result.is_ok(),
            "Operator disposed"
        );
        self.emit(
            OperatorEvent::Disposed,
            json!({ "bundles": self.bundle_sequence, "clean": result.is_ok(), "metrics": self.metrics.to_dict() }),
        );
        result
    }
}

#[async_trait]
impl<I, O> ElementConsumer<I> for ExecutionOperator<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn process_element(&mut self, value: WindowedValue<I>) -> Result<()> {
        self.ensure_live("process_element")?;
        if self.current_bundle_id().is_none() {
            self.open_bundle().await?;
        }

        // Held outside the handle while sending, so a cancelled send drops it.
        let Some(mut active) = self.handle.as_mut().and_then(|h| h.active.take()) else {
            return Err(BridgeError::IllegalState("no open bundle".to_string()));
        };
        if let Err(cause) = active.send(value).await {
            return Err(self.abandon(active, cause));
        }

        self.metrics.record_element();
        let full = active.is_full(&self.spec.config.bundle);
        if let Some(handle) = self.handle.as_mut() {
            handle.active = Some(active);
        }
        if full {
            self.close_active().await?;
        }
        Ok(())
    }

    async fn process_watermark(&mut self, watermark: DateTime<Utc>) -> Result<()> {
        self.ensure_live("process_watermark")?;
        self.close_active().await?;
        self.output
            .emit_watermark(watermark)
            .map_err(|cause| ExecutionError::new(BundlePhase::Watermark, "", cause))?;
        debug!(step = %self.spec.step_name, watermark = %watermark, "Watermark forwarded");
        Ok(())
    }
}

#[async_trait]
impl<I, O> Checkpointable for ExecutionOperator<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn checkpoint(&mut self, checkpoint_id: u64) -> Result<CheckpointReceipt> {
        self.ensure_live("checkpoint")?;
        let flushed_bundle = self.close_active().await?;
        self.checkpoint_epoch += 1;
        self.metrics.record_checkpoint();

        let receipt = CheckpointReceipt {
            checkpoint_id,
            taken_at: Utc::now(),
            flushed_bundle,
        };
        info!(
            step = %self.spec.step_name,
            checkpoint_id,
            flushed_bundle = ?receipt.flushed_bundle,
            "Checkpoint barrier passed"
        );
        self.emit(OperatorEvent::Checkpoint, receipt.to_dict());
        Ok(receipt)
    }
}

impl<I, O> Drop for ExecutionOperator<I, O> {
    fn drop(&mut self) {
        if self.handle.is_some() && !self.disposed {
            warn!(
                step = %self.spec.step_name,
                instance_id = %self.instance_id,
                "Operator dropped without dispose; bundle factory not released"
            );
        }
    }
}

impl<I, O> fmt::Debug for ExecutionOperator<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionOperator")
            .field("instance_id", &self.instance_id)
            .field("step_name", &self.spec.step_name)
            .field("open", &self.handle.is_some())
            .field("bundle_sequence", &self.bundle_sequence)
            .field("checkpoint_epoch", &self.checkpoint_epoch)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}
