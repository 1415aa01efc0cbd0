//! In-memory persistent store
//!
//! Same contract as the SQLite store, held in process memory behind one
//! mutex so record and vector writes are atomic together.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{MemoryFilter, PersistentStore, Result, StorageError};
use crate::memory::{ConsolidationReport, MemoryItem, StoredVector};

#[derive(Default)]
struct Tables {
    items: BTreeMap<String, MemoryItem>,
    vectors: HashMap<String, StoredVector>,
    history: Vec<ConsolidationReport>,
}

/// Process-local [`PersistentStore`]
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StorageError::Init("In-memory store lock poisoned".into()))
    }

    /// Drop a vector while keeping its memory (simulates records written
    /// without an embedding)
    pub fn forget_vector(&self, id: &str) -> Result<bool> {
        Ok(self.tables()?.vectors.remove(id).is_some())
    }

    /// Recorded consolidation runs, oldest first
    pub fn consolidation_history(&self) -> Result<Vec<ConsolidationReport>> {
        Ok(self.tables()?.history.clone())
    }
}

#[async_trait]
impl PersistentStore for InMemoryStore {
    async fn insert(&self, item: &MemoryItem, vector: &StoredVector) -> Result<()> {
        let mut tables = self.tables()?;
        if tables.items.contains_key(&item.id) {
            return Err(StorageError::Conflict(item.id.clone()));
        }
        tables.items.insert(item.id.clone(), item.clone());
        tables.vectors.insert(item.id.clone(), vector.clone());
        Ok(())
    }

    async fn save(&self, item: &MemoryItem, vector: Option<&StoredVector>) -> Result<()> {
        let mut tables = self.tables()?;
        match tables.items.get_mut(&item.id) {
            Some(existing) => *existing = item.clone(),
            None => return Err(StorageError::NotFound(item.id.clone())),
        }
        if let Some(vector) = vector {
            tables.vectors.insert(item.id.clone(), vector.clone());
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryItem>> {
        Ok(self.tables()?.items.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut tables = self.tables()?;
        tables.vectors.remove(id);
        Ok(tables.items.remove(id).is_some())
    }

    async fn list(&self, filter: &MemoryFilter) -> Result<Vec<MemoryItem>> {
        let tables = self.tables()?;
        Ok(filter.apply(tables.items.values().cloned()))
    }

    async fn count(&self, filter: &MemoryFilter) -> Result<usize> {
        let tables = self.tables()?;
        Ok(tables.items.values().filter(|i| filter.matches(i)).count())
    }

    async fn get_vector(&self, id: &str) -> Result<Option<StoredVector>> {
        Ok(self.tables()?.vectors.get(id).cloned())
    }

    async fn vectors(&self) -> Result<Vec<StoredVector>> {
        let tables = self.tables()?;
        let mut out: Vec<StoredVector> = tables.vectors.values().cloned().collect();
        out.sort_by(|a, b| a.memory_id.cmp(&b.memory_id));
        Ok(out)
    }

    async fn ids_without_vector(&self) -> Result<Vec<String>> {
        let tables = self.tables()?;
        Ok(tables
            .items
            .keys()
            .filter(|id| !tables.vectors.contains_key(*id))
            .cloned()
            .collect())
    }

    async fn record_consolidation(&self, report: &ConsolidationReport) -> Result<()> {
        self.tables()?.history.push(report.clone());
        Ok(())
    }

    async fn last_consolidation(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .tables()?
            .history
            .iter()
            .filter_map(|r| r.completed_at)
            .max())
    }
}
