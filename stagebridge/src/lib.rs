//! # Stagebridge
//!
//! Runs a compiled pipeline stage on an out-of-process executor from inside
//! a streaming engine's operator.
//!
//! The bridge provides:
//!
//! - **Bundle execution**: elements are sent to an executor bundle, which is
//!   closed at size/time bounds, watermarks, checkpoints and disposal
//! - **Output routing**: tagged results are demultiplexed to the host's main
//!   and side channels, resolved eagerly from a tag registry
//! - **Context bridging**: state and side-input handlers are obtained per
//!   bundle from an injected execution environment
//! - **Transferability**: an operator serializes to its spec alone and is
//!   rebuilt lazily on another worker
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagebridge::prelude::*;
//!
//! let spec = OperatorSpec::new("ParDo(Split)", descriptor, tags, job_info);
//! let mut operator = ExecutionOperator::new(spec, environment, output)?;
//!
//! operator.open().await?;
//! operator.process_element(WindowedValue::in_global_window(42)).await?;
//! operator.checkpoint(1).await?;
//! operator.dispose().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod bundle;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod operator;
pub mod router;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bundle::{
        BundleState, DataReceiver, InProcessBundleFactory, OutputReceiverFactory, RemoteBundle,
        StageBundleFactory,
    };
    pub use crate::config::{BundleConfig, OperatorConfig};
    pub use crate::context::{
        BundleProgressHandler, ExecutionEnvironment, HandlerScope, StateRequest,
        StateRequestHandler, StateResponse,
    };
    pub use crate::core::{
        ChannelId, CodecSpec, JobInfo, OutputChannel, StageDescriptor, Tag, TagRegistry,
        WindowedValue,
    };
    pub use crate::errors::{
        BridgeError, ConfigurationError, ExecutionError, ResourceReleaseError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::operator::{
        CheckpointReceipt, Checkpointable, ElementConsumer, ExecutionOperator, Lifecycle,
        OperatorSpec,
    };
    pub use crate::router::{OutputCollector, OutputRouter};
}
