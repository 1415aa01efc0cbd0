//! Keepsake end-to-end test support
//!
//! - [`harness`]: isolated on-disk engines
//! - [`mocks`]: test data factory and canned scenarios

pub mod harness;
pub mod mocks;

pub use harness::TestDatabaseManager;
pub use mocks::{TestDataFactory, TestScenario};
