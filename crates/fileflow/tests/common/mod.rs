//! Shared test utilities for fileflow integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs against temp input/output directories
//! - Scripted steps that sleep, fail, panic or count their invocations

pub mod harness;
pub mod steps;

pub use harness::TestHarness;
pub use steps::*;
