//! Testing utilities for operators.
//!
//! This module provides:
//! - A scripted bundle factory that records input and replays results
//! - A static execution environment
//! - A host output that collects values and watermarks
//! - Spec fixtures

mod fixtures;
mod mocks;

pub use fixtures::{test_job_info, OperatorFixture};
pub use mocks::{CollectingOutput, Emitted, ScriptedBundleFactory, StaticEnvironment};
