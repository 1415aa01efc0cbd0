//! Test Database Manager
//!
//! Provides isolated engines over on-disk databases for testing:
//! - Temporary databases that are automatically cleaned up
//! - Pre-seeded databases with test data
//! - Reopening an engine over the same file
//! - Concurrent test isolation

use std::path::PathBuf;
use std::sync::Arc;

use keepsake_core::{
    EngineConfig, HashingEmbedder, MemoryCandidate, MemoryEngine, MemoryFilter, MemoryKind,
    SqliteStore, WriteMode,
};
use tempfile::TempDir;

/// Manager for test databases
///
/// Creates an isolated database and engine for each test to prevent
/// interference. The temporary directory is deleted when dropped.
///
/// # Example
///
/// ```rust,ignore
/// let db = TestDatabaseManager::new_temp().await;
///
/// db.engine.store(MemoryCandidate::new("test content", MemoryKind::Fact)).await?;
///
/// // Database is automatically deleted when `db` goes out of scope
/// ```
pub struct TestDatabaseManager {
    /// The engine under test
    pub engine: MemoryEngine,
    /// Configuration the engine was built with
    config: EngineConfig,
    /// Temporary directory (kept alive to prevent premature deletion)
    _temp_dir: Option<TempDir>,
    /// Path to the database file
    db_path: PathBuf,
}

async fn open_engine(config: EngineConfig, db_path: PathBuf) -> MemoryEngine {
    let store = SqliteStore::open(Some(db_path)).expect("Failed to open test database");
    MemoryEngine::new(config, Arc::new(HashingEmbedder::default()), Arc::new(store))
        .await
        .expect("Failed to create test engine")
}

impl TestDatabaseManager {
    /// Create a new engine over a database in a temporary directory
    pub async fn new_temp() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    /// Create a new temporary engine with a custom configuration
    pub async fn with_config(config: EngineConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test_keepsake.db");
        let engine = open_engine(config.clone(), db_path.clone()).await;

        Self {
            engine,
            config,
            _temp_dir: Some(temp_dir),
            db_path,
        }
    }

    /// Create an engine over a database at a specific path
    ///
    /// The database is NOT automatically deleted.
    pub async fn new_at_path(path: PathBuf) -> Self {
        let config = EngineConfig::default();
        let engine = open_engine(config.clone(), path.clone()).await;

        Self {
            engine,
            config,
            _temp_dir: None,
            db_path: path,
        }
    }

    /// Get the database path
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Number of stored memories
    pub async fn memory_count(&self) -> usize {
        self.engine
            .stats()
            .await
            .map(|s| s.total_memories)
            .unwrap_or(0)
    }

    /// Check if the database is empty
    pub async fn is_empty(&self) -> bool {
        self.memory_count().await == 0
    }

    // ========================================================================
    // SEEDING METHODS
    // ========================================================================

    /// Seed with distinct facts (stored without write-time dedup)
    pub async fn seed_memories(&self, count: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(count);

        for i in 0..count {
            let candidate = MemoryCandidate::new(format!("Test memory content {}", i), MemoryKind::Fact)
                .with_tags([format!("test-{}", i % 5)]);
            if let Ok(id) = self
                .engine
                .long_term()
                .store_with(candidate, WriteMode::AlwaysInsert)
                .await
            {
                ids.push(id);
            }
        }

        ids
    }

    /// Seed every kind
    pub async fn seed_diverse(&self, count_per_kind: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(count_per_kind * MemoryKind::ALL.len());

        for kind in MemoryKind::ALL {
            for i in 0..count_per_kind {
                let candidate = MemoryCandidate::new(format!("Test {} content {}", kind, i), kind);
                if let Ok(id) = self
                    .engine
                    .long_term()
                    .store_with(candidate, WriteMode::AlwaysInsert)
                    .await
                {
                    ids.push(id);
                }
            }
        }

        ids
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Drop the engine and open a fresh one over the same database file
    pub async fn reopen(&mut self) {
        self.engine = open_engine(self.config.clone(), self.db_path.clone()).await;
    }

    /// Delete every memory
    pub async fn clear(&self) {
        if let Ok(items) = self.engine.list(&MemoryFilter::all()).await {
            for item in items {
                let _ = self.engine.delete(&item.id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_database_creation() {
        let db = TestDatabaseManager::new_temp().await;
        assert!(db.is_empty().await);
        assert!(db.path().exists());
    }

    #[tokio::test]
    async fn test_seed_memories() {
        let db = TestDatabaseManager::new_temp().await;
        let ids = db.seed_memories(10).await;

        assert_eq!(ids.len(), 10);
        assert_eq!(db.memory_count().await, 10);
    }

    #[tokio::test]
    async fn test_seed_diverse() {
        let db = TestDatabaseManager::new_temp().await;
        let ids = db.seed_diverse(2).await;

        // 10 kinds * 2 each = 20
        assert_eq!(ids.len(), 20);
        let stats = db.engine.stats().await.unwrap();
        assert!(stats.by_kind.values().all(|&n| n == 2));
    }

    #[tokio::test]
    async fn test_clear_database() {
        let db = TestDatabaseManager::new_temp().await;
        db.seed_memories(5).await;
        assert_eq!(db.memory_count().await, 5);

        db.clear().await;
        assert!(db.is_empty().await);
    }

    #[tokio::test]
    async fn test_reopen_keeps_memories() {
        let mut db = TestDatabaseManager::new_temp().await;
        db.seed_memories(3).await;

        db.reopen().await;
        assert_eq!(db.memory_count().await, 3);
        assert_eq!(db.engine.stats().await.unwrap().indexed, 3);
    }
}
