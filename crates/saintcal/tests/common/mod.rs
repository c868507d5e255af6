//! Shared test utilities for saintcal integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a file database, job tracker and worker pool in a temp directory
//! - Builders for workbooks and saint rows

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
