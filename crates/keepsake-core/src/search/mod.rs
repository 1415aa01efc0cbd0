//! Search Module
//!
//! - Exact cosine vector index with greedy clustering
//! - Keyword, entity and topic extraction

pub mod keywords;
mod vector;

pub use vector::{RebuildStats, VectorIndex, VectorIndexStats};
