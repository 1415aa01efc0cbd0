//! Episodes and patterns
//!
//! An episode is a memory of kind `Experience` whose metadata details carry
//! the event, its outcome, and the lessons derived from it.

use serde::{Deserialize, Serialize};

use super::item::{KindDetails, MemoryContext, MemoryItem};

/// Episode-specific fields stored under `metadata.details`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct EpisodeDetails {
    /// What happened
    pub event: String,
    /// How it turned out
    pub outcome: String,
    /// Who was involved
    pub participants: Vec<String>,
    /// Where it happened
    pub location: Option<String>,
    /// How long it took, in seconds
    pub duration_secs: Option<u64>,
    /// Emotions felt during the episode
    pub emotions: Vec<String>,
    /// Lessons derived when the episode was recorded
    pub lessons: Vec<String>,
    /// Whether the outcome was a success
    pub success: bool,
}

/// Input for recording an episode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EpisodeDraft {
    /// What happened
    pub event: String,
    /// How it turned out
    pub outcome: String,
    /// Who was involved
    #[serde(default)]
    pub participants: Vec<String>,
    /// Where it happened
    #[serde(default)]
    pub location: Option<String>,
    /// How long it took, in seconds
    #[serde(default)]
    pub duration_secs: Option<u64>,
    /// Emotions felt during the episode
    #[serde(default)]
    pub emotions: Vec<String>,
    /// Whether the outcome was a success
    #[serde(default)]
    pub success: bool,
    /// Scope and event time (now when absent)
    #[serde(default)]
    pub context: Option<MemoryContext>,
    /// Importance override
    #[serde(default)]
    pub importance: Option<f64>,
}

impl EpisodeDraft {
    /// Draft with an event, outcome and success flag
    pub fn new(event: impl Into<String>, outcome: impl Into<String>, success: bool) -> Self {
        Self {
            event: event.into(),
            outcome: outcome.into(),
            success,
            ..Default::default()
        }
    }

    /// Add participants
    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants = participants.into_iter().map(Into::into).collect();
        self
    }

    /// Add emotions
    pub fn with_emotions<I, S>(mut self, emotions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.emotions = emotions.into_iter().map(Into::into).collect();
        self
    }

    /// Set the duration
    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    /// Set the location
    pub fn at_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the context
    pub fn with_context(mut self, context: MemoryContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// A stored episode: the memory item plus its episode details
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodicMemory {
    /// The underlying memory
    pub item: MemoryItem,
    /// Episode fields
    pub details: EpisodeDetails,
}

impl EpisodicMemory {
    /// View an item as an episode; `None` when it carries no episode details
    pub fn from_item(item: MemoryItem) -> Option<Self> {
        let details = match &item.metadata.details {
            KindDetails::Episode(details) => details.clone(),
            _ => return None,
        };
        Some(Self { item, details })
    }

    /// Memory id
    pub fn id(&self) -> &str {
        &self.item.id
    }

    /// What happened
    pub fn event(&self) -> &str {
        &self.details.event
    }

    /// How it turned out
    pub fn outcome(&self) -> &str {
        &self.details.outcome
    }

    /// Whether it succeeded
    pub fn success(&self) -> bool {
        self.details.success
    }

    /// Derived lessons
    pub fn lessons(&self) -> &[String] {
        &self.details.lessons
    }
}

/// A recurring event shape mined from episodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    /// Stable identifier derived from the normalized event
    pub id: String,
    /// Human-readable summary
    pub description: String,
    /// Number of episodes in the group
    pub frequency: usize,
    /// min(0.9, 0.2 x frequency)
    pub confidence: f64,
    /// Ids of the grouped episodes
    pub related_episodes: Vec<String>,
    /// Success rate of the group, 0.0 - 1.0
    pub predictive_value: f64,
}
