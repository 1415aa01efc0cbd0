//! Episodic memory store
//!
//! Episodes are long-term memories of kind `Experience` with episode details
//! in their metadata. This layer derives lessons on write and answers
//! "what happened last time" questions over the stored episodes.

use std::sync::Arc;

use crate::error::{MemoryError, Result};
use crate::long_term::{LongTermStore, WriteMode, sentiment};
use crate::memory::{
    EpisodeDetails, EpisodeDraft, EpisodicMemory, KindDetails, MemoryCandidate, MemoryContext,
    MemoryKind, MemoryMetadata, Pattern, dedup_ordered, push_unique,
};
use crate::search::keywords::{extract_entities, extract_keywords, normalize_text};
use crate::storage::MemoryFilter;

use super::lessons::derive_lessons;
use super::patterns::extract_patterns;

/// Similar episodes returned by a lookup
const MAX_SIMILAR: usize = 10;

/// Similar episodes linked to a newly recorded one
const MAX_LINKED: usize = 5;

/// Outcomes and lessons quoted in a prediction, per section
const MAX_QUOTED: usize = 3;

/// Lexical fingerprint of a description used for episode matching
struct Probe {
    normalized: String,
    keywords: Vec<String>,
    entities: Vec<String>,
}

impl Probe {
    fn new(text: &str) -> Self {
        Self {
            normalized: normalize_text(text),
            keywords: extract_keywords(text, usize::MAX),
            entities: extract_entities(text)
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
        }
    }

    /// Substring either way, a shared keyword, or a shared entity
    fn matches(&self, event: &str) -> bool {
        if self.normalized.is_empty() {
            return false;
        }
        let other = Probe::new(event);
        if other.normalized.is_empty() {
            return false;
        }
        other.normalized.contains(&self.normalized)
            || self.normalized.contains(&other.normalized)
            || self.keywords.iter().any(|k| other.keywords.contains(k))
            || self.entities.iter().any(|e| other.entities.contains(e))
    }
}

/// Episodic layer over the long-term store
#[derive(Clone)]
pub struct EpisodicStore {
    long_term: Arc<LongTermStore>,
}

impl EpisodicStore {
    /// Create an episodic view of a long-term store
    pub fn new(long_term: Arc<LongTermStore>) -> Self {
        Self { long_term }
    }

    /// Record an episode with derived lessons; returns its id.
    ///
    /// Episodes are distinct events and are never merged on write. Up to 5
    /// similar earlier episodes are linked as relationships.
    pub async fn record_episode(&self, draft: EpisodeDraft) -> Result<String> {
        let mut violations = Vec::new();
        if draft.event.trim().is_empty() {
            violations.push("event must not be empty".to_string());
        }
        if draft.outcome.trim().is_empty() {
            violations.push("outcome must not be empty".to_string());
        }
        if !violations.is_empty() {
            return Err(MemoryError::Validation(violations));
        }

        let lessons = derive_lessons(&draft);
        let event = draft.event.trim().to_string();
        let outcome = draft.outcome.trim().to_string();
        let content = format!("{}: {}", event, outcome);

        let mut entities = extract_entities(&content);
        for participant in &draft.participants {
            push_unique(&mut entities, participant.trim());
        }

        let mut tags = vec![
            MemoryKind::Experience.as_str().to_string(),
            "episode".to_string(),
            if draft.success { "success" } else { "failure" }.to_string(),
        ];
        for keyword in extract_keywords(&event, 3) {
            push_unique(&mut tags, &keyword);
        }

        let sentiment_text = format!("{} {}", content, draft.emotions.join(" "));
        let metadata = MemoryMetadata {
            sentiment: sentiment::analyze(&sentiment_text),
            entities,
            details: KindDetails::Episode(EpisodeDetails {
                event: event.clone(),
                outcome,
                participants: dedup_ordered(draft.participants),
                location: draft.location,
                duration_secs: draft.duration_secs,
                emotions: dedup_ordered(draft.emotions),
                lessons,
                success: draft.success,
            }),
            ..Default::default()
        };

        let candidate = MemoryCandidate {
            content,
            kind: Some(MemoryKind::Experience),
            context: Some(draft.context.unwrap_or_else(MemoryContext::now)),
            importance: draft.importance,
            tags: Some(tags),
            metadata: Some(metadata),
            ..Default::default()
        };
        let id = self
            .long_term
            .store_with(candidate, WriteMode::AlwaysInsert)
            .await?;

        if let Err(e) = self.link_similar(&id, &event).await {
            tracing::warn!(id = %id, error = %e, "Failed to link similar episodes");
        }

        tracing::debug!(id = %id, success = draft.success, "Recorded episode");
        Ok(id)
    }

    async fn link_similar(&self, id: &str, event: &str) -> Result<()> {
        let similar: Vec<String> = self
            .find_similar_experiences(event)
            .await?
            .into_iter()
            .map(|e| e.item.id)
            .filter(|other| other != id)
            .take(MAX_LINKED)
            .collect();
        if !similar.is_empty() {
            self.long_term.add_relationships(id, &similar).await?;
        }
        Ok(())
    }

    /// Every stored episode, most important first
    pub async fn episodes(&self) -> Result<Vec<EpisodicMemory>> {
        let items = self.long_term.list(&MemoryFilter::episodes()).await?;
        Ok(items.into_iter().filter_map(EpisodicMemory::from_item).collect())
    }

    /// Episodes whose event lexically resembles `description`, most
    /// important first, at most 10
    pub async fn find_similar_experiences(&self, description: &str) -> Result<Vec<EpisodicMemory>> {
        let probe = Probe::new(description);
        let mut similar: Vec<EpisodicMemory> = self
            .episodes()
            .await?
            .into_iter()
            .filter(|e| probe.matches(e.event()))
            .collect();

        similar.sort_by(|a, b| {
            b.item
                .importance
                .total_cmp(&a.item.importance)
                .then_with(|| b.item.created_at.cmp(&a.item.created_at))
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        similar.truncate(MAX_SIMILAR);
        Ok(similar)
    }

    /// Summarize what happened in similar past episodes
    pub async fn predict_outcome(&self, scenario: &str) -> Result<String> {
        let similar = self.find_similar_experiences(scenario).await?;
        Ok(summarize_prediction(scenario, &similar))
    }

    /// Patterns over every stored episode
    pub async fn mine_patterns(&self) -> Result<Vec<Pattern>> {
        let episodes = self.episodes().await?;
        Ok(extract_patterns(&episodes))
    }
}

fn quote_section(out: &mut Vec<String>, title: &str, entries: Vec<String>) {
    if entries.is_empty() {
        return;
    }
    out.push(format!("{}:", title));
    out.extend(entries.into_iter().map(|e| format!("- {}", e)));
}

/// Free-text prediction over matched episodes
fn summarize_prediction(scenario: &str, similar: &[EpisodicMemory]) -> String {
    if similar.is_empty() {
        return format!(
            "No similar past experiences found for \"{}\"; no prediction available.",
            scenario.trim()
        );
    }

    let total = similar.len();
    let successes = similar.iter().filter(|e| e.success()).count();
    let rate = successes as f64 / total as f64 * 100.0;

    let outcomes = |success: bool| -> Vec<String> {
        dedup_ordered(
            similar
                .iter()
                .filter(|e| e.success() == success)
                .map(|e| e.outcome().to_string())
                .collect(),
        )
        .into_iter()
        .take(MAX_QUOTED)
        .collect()
    };
    let lessons: Vec<String> = dedup_ordered(
        similar
            .iter()
            .flat_map(|e| e.lessons().iter().cloned())
            .collect(),
    )
    .into_iter()
    .take(MAX_QUOTED)
    .collect();

    let mut lines = vec![
        format!(
            "Based on {} similar past experience{}:",
            total,
            if total == 1 { "" } else { "s" }
        ),
        format!("Success rate: {:.1}%", rate),
    ];
    quote_section(&mut lines, "Positive outcomes", outcomes(true));
    quote_section(&mut lines, "Negative outcomes", outcomes(false));
    quote_section(&mut lines, "Lessons learned", lessons);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::long_term_store;

    fn episodic() -> EpisodicStore {
        let (long_term, _) = long_term_store();
        EpisodicStore::new(Arc::new(long_term))
    }

    #[tokio::test]
    async fn test_record_episode_derives_lessons() {
        let store = episodic();
        let id = store
            .record_episode(EpisodeDraft::new("missed deadline", "client upset", false))
            .await
            .unwrap();

        let episodes = store.episodes().await.unwrap();
        assert_eq!(episodes.len(), 1);
        let episode = &episodes[0];
        assert_eq!(episode.id(), id);
        assert_eq!(episode.item.kind, MemoryKind::Experience);
        assert_eq!(episode.item.content, "missed deadline: client upset");
        assert!(episode.lessons()[0].contains("Avoid"));
        assert!(episode.lessons()[0].contains("missed deadline"));
        assert!(episode.item.metadata.sentiment < 0.0);
        assert!(episode.item.tags.contains(&"failure".to_string()));
    }

    #[tokio::test]
    async fn test_record_episode_validation() {
        let store = episodic();
        match store.record_episode(EpisodeDraft::new(" ", "", true)).await {
            Err(MemoryError::Validation(v)) => assert_eq!(v.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(store.episodes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identical_episodes_are_kept_and_linked() {
        let store = episodic();
        let first = store
            .record_episode(EpisodeDraft::new("Deployed on Friday", "Rollback needed", false))
            .await
            .unwrap();
        let second = store
            .record_episode(EpisodeDraft::new("Deployed on Friday", "Rollback needed", false))
            .await
            .unwrap();

        assert_ne!(first, second);
        let episodes = store.episodes().await.unwrap();
        assert_eq!(episodes.len(), 2);
        let newest = episodes.iter().find(|e| e.id() == second).unwrap();
        assert_eq!(newest.item.relationships, vec![first.clone()]);
        let oldest = episodes.iter().find(|e| e.id() == first).unwrap();
        assert!(!oldest.item.relationships.contains(&first));
    }

    #[tokio::test]
    async fn test_find_similar_matches_keywords_and_substrings() {
        let store = episodic();
        store
            .record_episode(EpisodeDraft::new("Database migration on staging", "went fine", true))
            .await
            .unwrap();
        store
            .record_episode(EpisodeDraft::new("Wrote release notes", "published", true))
            .await
            .unwrap();

        let hits = store.find_similar_experiences("the MIGRATION").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].event(), "Database migration on staging");

        assert!(store.find_similar_experiences("gardening").await.unwrap().is_empty());
        assert!(store.find_similar_experiences("  ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_predict_outcome_success_rate() {
        let store = episodic();
        for (outcome, success) in [
            ("customer renewed", true),
            ("customer upgraded", true),
            ("customer churned", false),
        ] {
            store
                .record_episode(EpisodeDraft::new("quarterly review call", outcome, success))
                .await
                .unwrap();
        }

        let prediction = store.predict_outcome("quarterly review call").await.unwrap();
        assert!(prediction.contains("Based on 3 similar past experiences"));
        assert!(prediction.contains("Success rate: 66.7%"));
        assert!(prediction.contains("- customer churned"));
        assert!(prediction.contains("Lessons learned:"));

        let none = store.predict_outcome("skydiving").await.unwrap();
        assert!(none.starts_with("No similar past experiences"));
    }

    #[tokio::test]
    async fn test_mine_patterns() {
        let store = episodic();
        for success in [true, false] {
            store
                .record_episode(EpisodeDraft::new("Weekly planning", "plan agreed", success))
                .await
                .unwrap();
        }
        store
            .record_episode(EpisodeDraft::new("Hackathon", "prototype built", true))
            .await
            .unwrap();

        let patterns = store.mine_patterns().await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].frequency, 2);
        assert_eq!(patterns[0].predictive_value, 0.5);
    }
}
