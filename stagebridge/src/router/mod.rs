//! Output routing.
//!
//! The router is built once per operator from the [`TagRegistry`]. Every tag
//! is resolved to its channel and codec up front, so an unknown tag is a
//! [`ConfigurationError`] the moment a bundle asks for it.

mod output;

pub use output::OutputCollector;

use crate::bundle::{DataReceiver, OutputReceiverFactory};
use crate::core::{CodecSpec, OutputChannel, Tag, TagRegistry, WindowedValue};
use crate::errors::ConfigurationError;
use crate::observability::BundleMetrics;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Receiver bound to one tag's destination channel.
pub struct RoutedReceiver<O> {
    tag: Tag,
    channel: OutputChannel,
    codec: CodecSpec,
    collector: Arc<dyn OutputCollector<O>>,
    metrics: Arc<BundleMetrics>,
}

impl<O> RoutedReceiver<O> {
    /// Returns the tag.
    #[must_use]
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Returns the destination channel.
    #[must_use]
    pub fn channel(&self) -> &OutputChannel {
        &self.channel
    }

    /// Returns the declared codec.
    #[must_use]
    pub fn codec(&self) -> &CodecSpec {
        &self.codec
    }
}

#[async_trait]
impl<O: Send + 'static> DataReceiver<O> for RoutedReceiver<O> {
    async fn accept(&self, value: WindowedValue<O>) -> anyhow::Result<()> {
        self.collector.emit(&self.channel, value)?;
        self.metrics.record_output(self.tag.id());
        Ok(())
    }
}

/// Demultiplexes tagged results to the host's channels.
pub struct OutputRouter<O> {
    routes: HashMap<String, Arc<RoutedReceiver<O>>>,
    declared: Vec<String>,
}

impl<O: Send + 'static> OutputRouter<O> {
    /// Builds the router, resolving every declared tag.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the registry is inconsistent.
    pub fn new(
        registry: &TagRegistry,
        collector: Arc<dyn OutputCollector<O>>,
        metrics: Arc<BundleMetrics>,
    ) -> Result<Self, ConfigurationError> {
        registry.validate(&[])?;

        let mut routes = HashMap::new();
        let mut declared = Vec::new();
        let main = std::iter::once((
            registry.main_tag().clone(),
            OutputChannel::Main,
            registry.main_codec().clone(),
        ));
        let additional = registry.additional().iter().map(|o| {
            (
                o.tag.clone(),
                OutputChannel::Side(o.channel.clone()),
                o.codec.clone(),
            )
        });

        for (tag, channel, codec) in main.chain(additional) {
            declared.push(tag.id().to_string());
            routes.insert(
                tag.id().to_string(),
                Arc::new(RoutedReceiver {
                    tag,
                    channel,
                    codec,
                    collector: collector.clone(),
                    metrics: metrics.clone(),
                }),
            );
        }

        Ok(Self { routes, declared })
    }

    /// Returns the channel a tag routes to.
    #[must_use]
    pub fn channel_for(&self, tag: &str) -> Option<&OutputChannel> {
        self.routes.get(tag).map(|r| r.channel())
    }

    /// Returns the codec declared for a tag.
    #[must_use]
    pub fn codec_for(&self, tag: &str) -> Option<&CodecSpec> {
        self.routes.get(tag).map(|r| r.codec())
    }

    /// Returns the declared tag ids, main first.
    #[must_use]
    pub fn declared_tags(&self) -> &[String] {
        &self.declared
    }

    fn resolve(&self, tag: &str) -> Result<&Arc<RoutedReceiver<O>>, ConfigurationError> {
        self.routes
            .get(tag)
            .ok_or_else(|| ConfigurationError::unknown_tag(tag, &self.declared))
    }
}

impl<O: Send + 'static> OutputReceiverFactory<O> for OutputRouter<O> {
    fn create(&self, tag: &str) -> Result<Arc<dyn DataReceiver<O>>, ConfigurationError> {
        let receiver: Arc<dyn DataReceiver<O>> = self.resolve(tag)?.clone();
        Ok(receiver)
    }
}

impl<O> fmt::Debug for OutputRouter<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputRouter")
            .field("declared", &self.declared)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChannelId;
    use crate::testing::CollectingOutput;
    use pretty_assertions::assert_eq;

    fn registry() -> TagRegistry {
        TagRegistry::new("main-output", CodecSpec::varint())
            .with_side_output("output-1", CodecSpec::varint())
            .with_additional("output-2", ChannelId::new("side-b"), CodecSpec::string_utf8())
    }

    #[test]
    fn test_routes_resolved_at_construction() {
        let output = Arc::new(CollectingOutput::<i32>::new());
        let router = OutputRouter::new(&registry(), output, Arc::new(BundleMetrics::default())).unwrap();

        assert_eq!(router.channel_for("main-output"), Some(&OutputChannel::Main));
        assert_eq!(
            router.channel_for("output-2"),
            Some(&OutputChannel::Side(ChannelId::new("side-b")))
        );
        assert_eq!(router.codec_for("output-2"), Some(&CodecSpec::string_utf8()));
        assert_eq!(
            router.declared_tags(),
            &["main-output".to_string(), "output-1".to_string(), "output-2".to_string()]
        );
    }

    #[test]
    fn test_unknown_tag_is_configuration_error() {
        let output = Arc::new(CollectingOutput::<i32>::new());
        let router = OutputRouter::new(&registry(), output, Arc::new(BundleMetrics::default())).unwrap();

        let err = router.create("output-3").err().unwrap();
        assert_eq!(err.code(), ConfigurationError::UNKNOWN_TAG);
        assert!(err.message.contains("main-output, output-1, output-2"));
    }

    #[tokio::test]
    async fn test_per_tag_order_preserved() {
        let output = Arc::new(CollectingOutput::<i32>::new());
        let metrics = Arc::new(BundleMetrics::default());
        let router = OutputRouter::new(&registry(), output.clone(), metrics.clone()).unwrap();

        let main = router.create("main-output").unwrap();
        let side = router.create("output-1").unwrap();
        for v in [1, 2, 3] {
            main.accept(WindowedValue::in_global_window(v)).await.unwrap();
            side.accept(WindowedValue::in_global_window(v * 10)).await.unwrap();
        }

        assert_eq!(output.main_values(), vec![1, 2, 3]);
        assert_eq!(output.side_values("output-1"), vec![10, 20, 30]);
        assert!(output.side_values("side-b").is_empty());
        assert_eq!(metrics.outputs_routed(), 6);
        assert_eq!(metrics.outputs_for_tag("output-1"), 3);
    }

    #[test]
    fn test_invalid_registry_rejected() {
        let output = Arc::new(CollectingOutput::<i32>::new());
        let reg = TagRegistry::new("main", CodecSpec::new(""));
        assert!(OutputRouter::new(&reg, output, Arc::new(BundleMetrics::default())).is_err());
    }
}
