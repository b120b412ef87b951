//! Shared test utilities for archscan integration tests.
//!
//! This module provides:
//! - `FakeTools`, a `ProcessRunner` standing in for the unpack utilities and the scanner
//! - `RecordingStore` and `RecordingProgress` collaborators that capture what the pool did
//! - `TestHarness` for isolated test execution with temp directories and archive fixtures

pub mod fakes;
pub mod harness;

#[allow(unused_imports)]
pub use fakes::{FakeTools, RecordingProgress, RecordingStore, RejectingStore};
pub use harness::TestHarness;
