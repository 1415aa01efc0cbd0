//! Long-Term Memory
//!
//! Durable storage with semantic retrieval:
//! - Write-time deduplication against the vector index
//! - Computed importance and lexical analysis on every write
//! - Weighted retrieval scoring (importance, similarity, keywords, recency)
//! - Relationship maintenance on delete and merge

pub mod scoring;
pub mod sentiment;
mod store;

pub use scoring::{ImportanceSignals, recency, retrieval_score};
pub use store::{LongTermStore, WriteMode, sanitize_content};
