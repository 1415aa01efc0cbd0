//! Pattern mining over episodes
//!
//! Episodes whose events normalize to the same text form a group; every
//! group of two or more is a pattern.

use std::collections::BTreeMap;

use crate::memory::{EpisodicMemory, Pattern};
use crate::search::keywords::normalize_text;

/// Minimum group size for a pattern
const MIN_FREQUENCY: usize = 2;

/// Confidence ceiling
const MAX_CONFIDENCE: f64 = 0.9;

/// Stable id for a normalized event
fn pattern_id(key: &str) -> String {
    let hash = blake3::hash(key.as_bytes()).to_hex();
    format!("pattern-{}", &hash[..16])
}

/// Group episodes by normalized event and summarize recurring groups.
///
/// Sorted by frequency desc, then description.
pub fn extract_patterns(episodes: &[EpisodicMemory]) -> Vec<Pattern> {
    let mut groups: BTreeMap<String, Vec<&EpisodicMemory>> = BTreeMap::new();
    for episode in episodes {
        let key = normalize_text(episode.event());
        if key.is_empty() {
            continue;
        }
        groups.entry(key).or_default().push(episode);
    }

    let mut patterns: Vec<Pattern> = groups
        .into_iter()
        .filter(|(_, members)| members.len() >= MIN_FREQUENCY)
        .map(|(key, members)| {
            let frequency = members.len();
            let successes = members.iter().filter(|e| e.success()).count();
            let success_rate = successes as f64 / frequency as f64;
            Pattern {
                id: pattern_id(&key),
                description: format!(
                    "Recurring event \"{}\" ({} occurrences, {:.0}% successful)",
                    key,
                    frequency,
                    success_rate * 100.0
                ),
                frequency,
                confidence: (0.2 * frequency as f64).min(MAX_CONFIDENCE),
                related_episodes: members.iter().map(|e| e.id().to_string()).collect(),
                predictive_value: success_rate,
            }
        })
        .collect();

    patterns.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then_with(|| a.description.cmp(&b.description))
    });
    patterns
}
