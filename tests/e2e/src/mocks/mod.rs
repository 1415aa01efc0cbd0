//! Test data

mod fixtures;

pub use fixtures::{TestDataFactory, TestScenario};
