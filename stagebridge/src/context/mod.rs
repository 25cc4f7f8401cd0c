//! Execution context bridge.
//!
//! This module provides:
//! - State and side-input request handling for a running bundle
//! - Bundle progress handlers
//! - The `ExecutionEnvironment` capability the host injects

mod environment;
mod progress;
mod state;

pub use environment::{ExecutionEnvironment, HandlerScope};
pub use progress::{BundleProgress, BundleProgressHandler, LoggingProgressHandler, NoOpProgressHandler};
#[cfg(test)]
pub use state::MockStateRequestHandler;
pub use state::{
    StateKey, StateRequest, StateRequestHandler, StateRequestKind, StateResponse,
    UnsupportedStateHandler,
};
