//! Memory Consolidation Module
//!
//! Folds near-duplicate memories into fewer, richer records:
//! - Greedy one-hop clustering over the vector index
//! - Per-cluster merges under per-id locks
//! - Recorded run history
//! - Optional periodic scheduler that also prunes expired memories

mod engine;
mod scheduler;

pub use engine::ConsolidationEngine;
pub use scheduler::{ConsolidationScheduler, SchedulerHandle};
