//! Storage Module
//!
//! The persistent store is the source of truth for memories and their
//! vectors. The engine talks to it through [`PersistentStore`]:
//! - `SqliteStore`: SQLite with versioned migrations and WAL
//! - `InMemoryStore`: process-local, for tests and ephemeral agents

mod memory_store;
mod migrations;
mod sqlite;

pub use memory_store::InMemoryStore;
pub use migrations::{MIGRATIONS, Migration};
pub use sqlite::SqliteStore;

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::memory::{ConsolidationReport, MemoryItem, MemoryKind, StoredVector, TimeRange};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Memory not found
    #[error("Memory not found: {0}")]
    NotFound(String),
    /// Memory already exists
    #[error("Memory already exists: {0}")]
    Conflict(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON column could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Invalid timestamp
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
    /// Blocking task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// FILTER
// ============================================================================

/// Listing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Importance desc, then last access desc, then id
    #[default]
    ImportanceDesc,
    /// Oldest first, then id
    CreatedAsc,
    /// Newest first, then id
    CreatedDesc,
    /// Least recently accessed first, then id
    LastAccessedAsc,
}

impl SortOrder {
    /// Compare two items under this order
    pub fn compare(&self, a: &MemoryItem, b: &MemoryItem) -> Ordering {
        let primary = match self {
            SortOrder::ImportanceDesc => b
                .importance
                .total_cmp(&a.importance)
                .then_with(|| b.last_accessed.cmp(&a.last_accessed)),
            SortOrder::CreatedAsc => a.created_at.cmp(&b.created_at),
            SortOrder::CreatedDesc => b.created_at.cmp(&a.created_at),
            SortOrder::LastAccessedAsc => a.last_accessed.cmp(&b.last_accessed),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

/// Filter, order and page for listing memories
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    /// Restrict to these kinds (empty = all)
    pub kinds: Vec<MemoryKind>,
    /// Importance floor (inclusive)
    pub min_importance: Option<f64>,
    /// Creation-time window
    pub created: Option<TimeRange>,
    /// Scope: user
    pub user_id: Option<String>,
    /// Scope: conversation
    pub conversation_id: Option<String>,
    /// Scope: workspace
    pub workspace_id: Option<String>,
    /// Only memories whose relationships or contradictions name this id
    pub references: Option<String>,
    /// Only episodes
    pub episodes_only: bool,
    /// Ordering
    pub sort: SortOrder,
    /// Page size (all when absent)
    pub limit: Option<usize>,
    /// Rows to skip
    pub offset: usize,
}

impl MemoryFilter {
    /// Every memory, default order
    pub fn all() -> Self {
        Self::default()
    }

    /// Memories that reference `id`
    pub fn referencing(id: impl Into<String>) -> Self {
        Self {
            references: Some(id.into()),
            ..Self::default()
        }
    }

    /// Every episode, default order
    pub fn episodes() -> Self {
        Self {
            episodes_only: true,
            ..Self::default()
        }
    }

    /// Set the page size
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the ordering
    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    /// Whether an item passes the filter (ignores order and paging)
    pub fn matches(&self, item: &MemoryItem) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&item.kind) {
            return false;
        }
        if self.min_importance.is_some_and(|min| item.importance < min) {
            return false;
        }
        if self.created.is_some_and(|range| !range.contains(item.created_at)) {
            return false;
        }
        let scope_ok = |want: &Option<String>, have: &Option<String>| {
            want.as_ref().is_none_or(|w| have.as_ref() == Some(w))
        };
        if !scope_ok(&self.user_id, &item.context.user_id)
            || !scope_ok(&self.conversation_id, &item.context.conversation_id)
            || !scope_ok(&self.workspace_id, &item.context.workspace_id)
        {
            return false;
        }
        if self.references.as_ref().is_some_and(|id| !item.references(id)) {
            return false;
        }
        if self.episodes_only && !item.is_episode() {
            return false;
        }
        true
    }

    /// Filter, sort and page an in-memory collection
    pub fn apply(&self, items: impl IntoIterator<Item = MemoryItem>) -> Vec<MemoryItem> {
        let mut out: Vec<MemoryItem> = items.into_iter().filter(|i| self.matches(i)).collect();
        out.sort_by(|a, b| self.sort.compare(a, b));
        out.into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

// ============================================================================
// PERSISTENT STORE CONTRACT
// ============================================================================

/// Abstract persistence for memories and their vectors.
///
/// Writes replace whole records, so a concurrent reader sees either the old
/// or the new version of a memory, never a mix.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Insert a new memory together with its vector, atomically.
    /// Fails with `Conflict` if the id exists.
    async fn insert(&self, item: &MemoryItem, vector: &StoredVector) -> Result<()>;

    /// Replace an existing memory, and its vector when given, atomically.
    /// Fails with `NotFound` if the id does not exist.
    async fn save(&self, item: &MemoryItem, vector: Option<&StoredVector>) -> Result<()>;

    /// Fetch a memory
    async fn get(&self, id: &str) -> Result<Option<MemoryItem>>;

    /// Delete a memory and its vector; returns whether it existed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Filtered, ordered, paged listing
    async fn list(&self, filter: &MemoryFilter) -> Result<Vec<MemoryItem>>;

    /// Number of memories passing the filter (paging ignored)
    async fn count(&self, filter: &MemoryFilter) -> Result<usize>;

    /// Persisted vector of a memory
    async fn get_vector(&self, id: &str) -> Result<Option<StoredVector>>;

    /// Every persisted vector
    async fn vectors(&self) -> Result<Vec<StoredVector>>;

    /// Ids of memories that have no persisted vector, sorted
    async fn ids_without_vector(&self) -> Result<Vec<String>>;

    /// Record a finished consolidation run
    async fn record_consolidation(&self, _report: &ConsolidationReport) -> Result<()> {
        Ok(())
    }

    /// Completion time of the most recent recorded consolidation
    async fn last_consolidation(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(None)
    }
}

/// Fixed-width RFC3339 so stored timestamps sort lexicographically
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidTimestamp(format!("{}: {}", value, e)))
}
