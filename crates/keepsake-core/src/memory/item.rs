//! Memory Item - The stored unit of knowledge or experience
//!
//! Each item carries:
//! - Sanitized content and a kind
//! - Conversational scope (user / conversation / workspace)
//! - Ranking signals (importance, confidence, access statistics)
//! - Soft references to other items
//! - Analysis metadata plus a per-kind details union

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::episode::EpisodeDetails;

/// Current time at microsecond precision (what the stores persist)
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// ============================================================================
// MEMORY KINDS
// ============================================================================

/// Kinds of memory items
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// A discrete fact
    #[default]
    Fact,
    /// Something the user likes or dislikes
    Preference,
    /// Something that happened (episodes are experiences)
    Experience,
    /// A passing observation
    Observation,
    /// A capability
    Skill,
    /// A relation to a person or entity
    Relationship,
    /// Something being worked towards
    Goal,
    /// A concrete to-do
    Task,
    /// General background knowledge
    Knowledge,
    /// A conversational exchange
    Conversation,
}

impl MemoryKind {
    /// Every kind, in declaration order
    pub const ALL: [MemoryKind; 10] = [
        MemoryKind::Fact,
        MemoryKind::Preference,
        MemoryKind::Experience,
        MemoryKind::Observation,
        MemoryKind::Skill,
        MemoryKind::Relationship,
        MemoryKind::Goal,
        MemoryKind::Task,
        MemoryKind::Knowledge,
        MemoryKind::Conversation,
    ];

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Fact => "fact",
            MemoryKind::Preference => "preference",
            MemoryKind::Experience => "experience",
            MemoryKind::Observation => "observation",
            MemoryKind::Skill => "skill",
            MemoryKind::Relationship => "relationship",
            MemoryKind::Goal => "goal",
            MemoryKind::Task => "task",
            MemoryKind::Knowledge => "knowledge",
            MemoryKind::Conversation => "conversation",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        MemoryKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| format!("Unknown memory kind: {}", s))
    }
}

// ============================================================================
// CONTEXT & SOURCE
// ============================================================================

/// Conversational scope of a memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryContext {
    /// Owning user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Conversation the memory came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Workspace / project scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    /// When the remembered thing happened
    pub timestamp: DateTime<Utc>,
}

impl MemoryContext {
    /// Unscoped context stamped with the current time
    pub fn now() -> Self {
        Self {
            user_id: None,
            conversation_id: None,
            workspace_id: None,
            timestamp: now(),
        }
    }

    /// Context owned by a user
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::now()
        }
    }

    /// Scope to a conversation
    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Scope to a workspace
    pub fn in_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// Override the event timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Owner key: user, conversation and workspace
    pub fn scope(&self) -> (Option<&str>, Option<&str>, Option<&str>) {
        (
            self.user_id.as_deref(),
            self.conversation_id.as_deref(),
            self.workspace_id.as_deref(),
        )
    }

    /// Whether both contexts belong to the same user, conversation and workspace
    pub fn same_scope(&self, other: &MemoryContext) -> bool {
        self.scope() == other.scope()
    }
}

impl Default for MemoryContext {
    fn default() -> Self {
        Self::now()
    }
}

/// Where a memory came from and how much to trust it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySource {
    /// Origin label ("user", "assistant", "import", ...)
    pub origin: String,
    /// Trust in the origin, 0.0 - 1.0
    pub reliability: f64,
}

impl MemorySource {
    /// Create a source
    pub fn new(origin: impl Into<String>, reliability: f64) -> Self {
        Self {
            origin: origin.into(),
            reliability,
        }
    }
}

// ============================================================================
// METADATA
// ============================================================================

/// Per-kind structured details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum KindDetails {
    /// No kind-specific fields
    #[default]
    General,
    /// A discrete episode (kind Experience)
    Episode(EpisodeDetails),
    /// A like or dislike
    Preference {
        /// What the preference is about
        subject: String,
        /// Like (true) or dislike (false)
        positive: bool,
    },
    /// A goal and its progress
    Goal {
        /// Optional target date
        deadline: Option<DateTime<Utc>>,
        /// Progress, 0.0 - 1.0
        progress: f64,
    },
    /// A task and its state
    Task {
        /// Optional due date
        due: Option<DateTime<Utc>>,
        /// Whether the task is done
        completed: bool,
    },
    /// A capability level
    Skill {
        /// Proficiency, 0.0 - 1.0
        proficiency: f64,
    },
    /// A relation to an entity
    Relationship {
        /// Who or what the relation points at
        entity: String,
        /// Nature of the relation
        relation: String,
    },
}

impl KindDetails {
    /// Name used for filtering and storage
    pub fn type_name(&self) -> &'static str {
        match self {
            KindDetails::General => "general",
            KindDetails::Episode(_) => "episode",
            KindDetails::Preference { .. } => "preference",
            KindDetails::Goal { .. } => "goal",
            KindDetails::Task { .. } => "task",
            KindDetails::Skill { .. } => "skill",
            KindDetails::Relationship { .. } => "relationship",
        }
    }

    /// Episode details, if this is an episode
    pub fn as_episode(&self) -> Option<&EpisodeDetails> {
        match self {
            KindDetails::Episode(details) => Some(details),
            _ => None,
        }
    }
}

/// Analysis metadata attached to every memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryMetadata {
    /// Sentiment, -1.0 (negative) to 1.0 (positive)
    pub sentiment: f64,
    /// Named entities found in the content
    pub entities: Vec<String>,
    /// Salient keywords, most frequent first
    pub keywords: Vec<String>,
    /// Coarse topics
    pub topics: Vec<String>,
    /// Whether the memory has been confirmed
    pub verified: bool,
    /// Ids of memories this one contradicts
    pub contradicts: Vec<String>,
    /// Kind-specific fields
    pub details: KindDetails,
    /// Contents absorbed from merged duplicates
    pub merged_variants: Vec<String>,
    /// Free-form extension fields
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ============================================================================
// MEMORY ITEM
// ============================================================================

/// A stored memory
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryItem {
    /// Unique identifier (UUID v4), immutable
    pub id: String,
    /// Kind of memory
    pub kind: MemoryKind,
    /// Sanitized content
    pub content: String,
    /// Scope and event time
    pub context: MemoryContext,
    /// Priority signal, 0.0 - 1.0
    pub importance: f64,
    /// Belief strength, 0.0 - 1.0
    pub confidence: f64,
    /// Ordered, duplicate-free tags
    pub tags: Vec<String>,
    /// Ordered, duplicate-free ids of related memories
    pub relationships: Vec<String>,
    /// When the memory was stored
    pub created_at: DateTime<Utc>,
    /// Last read or write
    pub last_accessed: DateTime<Utc>,
    /// Number of times returned by retrieval (never decreases)
    pub access_count: u64,
    /// Provenance
    pub source: MemorySource,
    /// Analysis metadata
    pub metadata: MemoryMetadata,
}

impl MemoryItem {
    /// Whether this item references `id` as a relationship or contradiction
    pub fn references(&self, id: &str) -> bool {
        self.relationships.iter().any(|r| r == id)
            || self.metadata.contradicts.iter().any(|c| c == id)
    }

    /// Whether this item is an episode
    pub fn is_episode(&self) -> bool {
        matches!(self.metadata.details, KindDetails::Episode(_))
    }

    /// Age in fractional days relative to `now`, measured from the event time
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        let secs = (now - self.context.timestamp).num_seconds().max(0) as f64;
        secs / 86_400.0
    }
}

/// Append `value` unless already present, preserving order
pub(crate) fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        false
    } else {
        list.push(value.to_string());
        true
    }
}

/// Remove duplicates, keeping first occurrences in order
pub(crate) fn dedup_ordered(list: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(list.len());
    for value in list {
        push_unique(&mut out, &value);
    }
    out
}

// ============================================================================
// VECTORS
// ============================================================================

/// A persisted embedding of a memory's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredVector {
    /// Memory this vector embeds
    pub memory_id: String,
    /// Model that produced the vector
    pub model: String,
    /// The vector; dimension is its length
    pub vector: Vec<f32>,
}

impl StoredVector {
    /// Create a stored vector
    pub fn new(memory_id: impl Into<String>, model: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            memory_id: memory_id.into(),
            model: model.into(),
            vector,
        }
    }

    /// Vector dimension
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for storing a new memory
///
/// `kind` and `context` are optional so a malformed request can be reported
/// with every missing field at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MemoryCandidate {
    /// Raw content (sanitized on write)
    pub content: String,
    /// Kind of memory
    #[serde(default)]
    pub kind: Option<MemoryKind>,
    /// Scope and event time
    #[serde(default)]
    pub context: Option<MemoryContext>,
    /// Importance override; computed when absent
    #[serde(default)]
    pub importance: Option<f64>,
    /// Confidence; configured default when absent
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Tags; derived from kind and keywords when absent
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Ids of related memories; unknown ids are dropped
    #[serde(default)]
    pub relationships: Vec<String>,
    /// Provenance; configured default when absent
    #[serde(default)]
    pub source: Option<MemorySource>,
    /// Metadata; analysis fields left empty are filled in
    #[serde(default)]
    pub metadata: Option<MemoryMetadata>,
}

impl MemoryCandidate {
    /// Candidate of `kind` stamped with the current time
    pub fn new(content: impl Into<String>, kind: MemoryKind) -> Self {
        Self {
            content: content.into(),
            kind: Some(kind),
            context: Some(MemoryContext::now()),
            ..Default::default()
        }
    }

    /// Replace the context
    pub fn with_context(mut self, context: MemoryContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the importance override
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    /// Set the confidence
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Set explicit tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Reference other memories
    pub fn with_relationships<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationships = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Set the provenance
    pub fn with_source(mut self, source: MemorySource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set metadata
    pub fn with_metadata(mut self, metadata: MemoryMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Partial update of a memory; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MemoryPatch {
    /// New content (re-embedded before the write)
    #[serde(default)]
    pub content: Option<String>,
    /// New importance
    #[serde(default)]
    pub importance: Option<f64>,
    /// New confidence
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Replacement tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Replacement relationships
    #[serde(default)]
    pub relationships: Option<Vec<String>>,
    /// Replacement contradiction list
    #[serde(default)]
    pub contradicts: Option<Vec<String>>,
    /// Replacement provenance
    #[serde(default)]
    pub source: Option<MemorySource>,
    /// Replacement metadata
    #[serde(default)]
    pub metadata: Option<MemoryMetadata>,
}

impl MemoryPatch {
    /// Patch replacing the content
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Whether the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.importance.is_none()
            && self.confidence.is_none()
            && self.tags.is_none()
            && self.relationships.is_none()
            && self.contradicts.is_none()
            && self.source.is_none()
            && self.metadata.is_none()
    }
}

/// Half-open window `[start, end)` over creation time
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    /// Inclusive lower bound
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Whether `at` falls within the range
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| at >= s) && self.end.is_none_or(|e| at < e)
    }
}

/// Retrieval request
#[derive(Debug, Clone, Default)]
pub struct RetrievalQuery {
    /// Free-text query
    pub text: String,
    /// Restrict to these kinds (empty = all)
    pub kinds: Vec<MemoryKind>,
    /// Importance floor
    pub min_importance: Option<f64>,
    /// Creation-time window
    pub time_range: Option<TimeRange>,
    /// Scope: user
    pub user_id: Option<String>,
    /// Scope: conversation
    pub conversation_id: Option<String>,
    /// Scope: workspace
    pub workspace_id: Option<String>,
    /// Result cap (configured default when absent)
    pub limit: Option<usize>,
    /// Abort the scan after this long
    pub timeout: Option<std::time::Duration>,
}

impl RetrievalQuery {
    /// Query for `text` with default filters
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Restrict to kinds
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = MemoryKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Require a minimum importance
    pub fn with_min_importance(mut self, min: f64) -> Self {
        self.min_importance = Some(min);
        self
    }

    /// Restrict to a creation-time window
    pub fn within(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// Scope to a user
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Scope to a conversation
    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Scope to a workspace
    pub fn in_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// Cap the number of results
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Abort after `timeout`
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
