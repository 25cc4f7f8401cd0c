//! Core domain model types for the bridge.
//!
//! This module contains the immutable values shared by every component:
//! - Stage descriptors and job identity
//! - Output tags, channels and the tag registry
//! - Windowed values and codec identities

mod codec;
mod descriptor;
mod job;
mod tag;
mod window;

pub use codec::CodecSpec;
pub use descriptor::{EnvironmentSpec, StageDescriptor};
pub use job::JobInfo;
pub use tag::{AdditionalOutput, ChannelId, OutputChannel, Tag, TagRegistry};
pub use window::{BoundedWindow, PaneInfo, PaneTiming, WindowedValue};
