//! Episodic Memory
//!
//! Discrete events with outcomes:
//! - Lessons derived on write
//! - Lexical lookup of similar past episodes
//! - Outcome prediction from those episodes
//! - Recurring-event patterns

mod lessons;
mod patterns;
mod store;

pub use lessons::derive_lessons;
pub use patterns::extract_patterns;
pub use store::EpisodicStore;
