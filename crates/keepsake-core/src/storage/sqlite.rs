//! SQLite Storage Implementation
//!
//! Memories and their vectors in one database file. A writer connection
//! applies migrations and all writes; a separate reader connection serves
//! listing and lookups so reads do not queue behind writes under WAL.
//! Every call runs on tokio's blocking pool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params, params_from_iter};

use super::{
    MemoryFilter, PersistentStore, Result, SortOrder, StorageError, format_timestamp,
    parse_timestamp,
};
use crate::embeddings::Embedding;
use crate::memory::{
    ConsolidationReport, MemoryContext, MemoryItem, MemoryKind, MemoryMetadata, MemorySource,
    StoredVector,
};

const ITEM_COLUMNS: &str = "id, kind, content, user_id, conversation_id, workspace_id, \
    context_timestamp, importance, confidence, tags, relationships, created_at, \
    last_accessed, access_count, source_origin, source_reliability, metadata";

// ============================================================================
// STORE
// ============================================================================

struct Connections {
    writer: Mutex<Connection>,
    /// Absent for in-memory databases, which cannot be shared across connections
    reader: Option<Mutex<Connection>>,
}

impl Connections {
    fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .as_ref()
            .unwrap_or(&self.writer)
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))
    }
}

/// SQLite-backed [`PersistentStore`]
///
/// Cheap to clone; clones share the same connections.
#[derive(Clone)]
pub struct SqliteStore {
    connections: Arc<Connections>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Apply PRAGMAs and optional encryption to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        #[cfg(feature = "encryption")]
        {
            if let Ok(key) = std::env::var("KEEPSAKE_ENCRYPTION_KEY") {
                if !key.is_empty() {
                    conn.pragma_update(None, "key", &key)?;
                }
            }
        }

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA journal_size_limit = 67108864;",
        )?;

        Ok(())
    }

    /// Open (creating if needed) a database file.
    ///
    /// With no path the platform data directory is used
    /// (`ProjectDirs::from("com", "keepsake", "core")`).
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => Self::default_path()?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer_conn = Connection::open(&path)?;

        // Restrict database file permissions to owner-only on Unix
        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;
        let applied = super::migrations::apply_migrations(&writer_conn)?;
        if applied > 0 {
            tracing::info!(path = %path.display(), applied, "Database migrated");
        }

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            connections: Arc::new(Connections {
                writer: Mutex::new(writer_conn),
                reader: Some(Mutex::new(reader_conn)),
            }),
            path: Some(path),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        super::migrations::apply_migrations(&conn)?;
        Ok(Self {
            connections: Arc::new(Connections {
                writer: Mutex::new(conn),
                reader: None,
            }),
            path: None,
        })
    }

    /// Default database location in the platform data directory
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "keepsake", "core").ok_or_else(|| {
            StorageError::Init("Could not determine project directories".to_string())
        })?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        // Restrict directory permissions to owner-only on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            let _ = std::fs::set_permissions(data_dir, perms);
        }
        Ok(data_dir.join("keepsake.db"))
    }

    /// Database file, if on disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Schema version currently applied
    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.connections.reader()?;
        Ok(super::migrations::get_current_version(&conn)?)
    }

    async fn with_reader<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let connections = Arc::clone(&self.connections);
        tokio::task::spawn_blocking(move || {
            let conn = connections.reader()?;
            f(&conn)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    async fn with_writer<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let connections = Arc::clone(&self.connections);
        tokio::task::spawn_blocking(move || {
            let mut conn = connections.writer()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|e| conversion_error(idx, e))
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<MemoryItem> {
    let kind_raw: String = row.get(1)?;
    let kind: MemoryKind = kind_raw
        .parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into()))?;
    let access_count: i64 = row.get(13)?;
    let metadata: MemoryMetadata = json_column(row, 16)?;

    Ok(MemoryItem {
        id: row.get(0)?,
        kind,
        content: row.get(2)?,
        context: MemoryContext {
            user_id: row.get(3)?,
            conversation_id: row.get(4)?,
            workspace_id: row.get(5)?,
            timestamp: timestamp_column(row, 6)?,
        },
        importance: row.get(7)?,
        confidence: row.get(8)?,
        tags: json_column(row, 9)?,
        relationships: json_column(row, 10)?,
        created_at: timestamp_column(row, 11)?,
        last_accessed: timestamp_column(row, 12)?,
        access_count: u64::try_from(access_count).unwrap_or(0),
        source: MemorySource {
            origin: row.get(14)?,
            reliability: row.get(15)?,
        },
        metadata,
    })
}

fn row_to_vector(row: &Row<'_>) -> rusqlite::Result<StoredVector> {
    let memory_id: String = row.get(0)?;
    let model: String = row.get(1)?;
    let bytes: Vec<u8> = row.get(2)?;
    let embedding = Embedding::from_bytes(&bytes).ok_or_else(|| {
        conversion_error(2, StorageError::Init(format!("Corrupt vector blob for {}", memory_id)))
    })?;
    Ok(StoredVector {
        memory_id,
        model,
        vector: embedding.vector,
    })
}

/// Column values for an item, in `ITEM_COLUMNS` order, plus `details_type`
fn item_values(item: &MemoryItem) -> Result<Vec<Value>> {
    let access_count = i64::try_from(item.access_count).unwrap_or(i64::MAX);
    let opt = |v: &Option<String>| v.clone().map(Value::Text).unwrap_or(Value::Null);
    Ok(vec![
        Value::Text(item.id.clone()),
        Value::Text(item.kind.as_str().to_string()),
        Value::Text(item.content.clone()),
        opt(&item.context.user_id),
        opt(&item.context.conversation_id),
        opt(&item.context.workspace_id),
        Value::Text(format_timestamp(item.context.timestamp)),
        Value::Real(item.importance),
        Value::Real(item.confidence),
        Value::Text(serde_json::to_string(&item.tags)?),
        Value::Text(serde_json::to_string(&item.relationships)?),
        Value::Text(format_timestamp(item.created_at)),
        Value::Text(format_timestamp(item.last_accessed)),
        Value::Integer(access_count),
        Value::Text(item.source.origin.clone()),
        Value::Real(item.source.reliability),
        Value::Text(serde_json::to_string(&item.metadata)?),
        Value::Text(item.metadata.details.type_name().to_string()),
    ])
}

fn upsert_vector(conn: &Connection, vector: &StoredVector) -> Result<()> {
    let blob = Embedding::new(vector.vector.clone()).to_bytes();
    conn.execute(
        "INSERT OR REPLACE INTO memory_vectors (memory_id, model, dimensions, vector, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            vector.memory_id,
            vector.model,
            vector.vector.len() as i64,
            blob,
            format_timestamp(Utc::now())
        ],
    )?;
    Ok(())
}

/// WHERE clause and parameters for a filter (paging and order excluded)
fn where_clause(filter: &MemoryFilter) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if !filter.kinds.is_empty() {
        let placeholders = vec!["?"; filter.kinds.len()].join(", ");
        clauses.push(format!("kind IN ({})", placeholders));
        values.extend(filter.kinds.iter().map(|k| Value::Text(k.as_str().to_string())));
    }
    if let Some(min) = filter.min_importance {
        clauses.push("importance >= ?".to_string());
        values.push(Value::Real(min));
    }
    if let Some(range) = filter.created {
        if let Some(start) = range.start {
            clauses.push("created_at >= ?".to_string());
            values.push(Value::Text(format_timestamp(start)));
        }
        if let Some(end) = range.end {
            clauses.push("created_at < ?".to_string());
            values.push(Value::Text(format_timestamp(end)));
        }
    }
    for (column, want) in [
        ("user_id", &filter.user_id),
        ("conversation_id", &filter.conversation_id),
        ("workspace_id", &filter.workspace_id),
    ] {
        if let Some(want) = want {
            clauses.push(format!("{} = ?", column));
            values.push(Value::Text(want.clone()));
        }
    }
    if let Some(id) = &filter.references {
        clauses.push(
            "(EXISTS (SELECT 1 FROM json_each(memories.relationships) WHERE json_each.value = ?) \
             OR EXISTS (SELECT 1 FROM json_each(memories.metadata, '$.contradicts') \
             WHERE json_each.value = ?))"
                .to_string(),
        );
        values.push(Value::Text(id.clone()));
        values.push(Value::Text(id.clone()));
    }
    if filter.episodes_only {
        clauses.push("details_type = 'episode'".to_string());
    }

    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (sql, values)
}

fn order_clause(sort: SortOrder) -> &'static str {
    match sort {
        SortOrder::ImportanceDesc => " ORDER BY importance DESC, last_accessed DESC, id ASC",
        SortOrder::CreatedAsc => " ORDER BY created_at ASC, id ASC",
        SortOrder::CreatedDesc => " ORDER BY created_at DESC, id ASC",
        SortOrder::LastAccessedAsc => " ORDER BY last_accessed ASC, id ASC",
    }
}

// ============================================================================
// PERSISTENT STORE
// ============================================================================

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn insert(&self, item: &MemoryItem, vector: &StoredVector) -> Result<()> {
        let values = item_values(item)?;
        let id = item.id.clone();
        let vector = vector.clone();

        self.with_writer(move |conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                &format!(
                    "INSERT INTO memories ({}, details_type) VALUES ({})",
                    ITEM_COLUMNS,
                    vec!["?"; values.len()].join(", ")
                ),
                params_from_iter(values.iter()),
            );
            match inserted {
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    return Err(StorageError::Conflict(id));
                }
                other => {
                    other?;
                }
            }
            upsert_vector(&tx, &vector)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn save(&self, item: &MemoryItem, vector: Option<&StoredVector>) -> Result<()> {
        let mut values = item_values(item)?;
        let id = item.id.clone();
        let vector = vector.cloned();

        self.with_writer(move |conn| {
            // id moves to the end for the WHERE clause
            let id_value = values.remove(0);
            values.push(id_value);

            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE memories SET
                    kind = ?, content = ?, user_id = ?, conversation_id = ?, workspace_id = ?,
                    context_timestamp = ?, importance = ?, confidence = ?, tags = ?,
                    relationships = ?, created_at = ?, last_accessed = ?, access_count = ?,
                    source_origin = ?, source_reliability = ?, metadata = ?, details_type = ?
                 WHERE id = ?",
                params_from_iter(values.iter()),
            )?;
            if changed == 0 {
                return Err(StorageError::NotFound(id));
            }
            if let Some(vector) = &vector {
                upsert_vector(&tx, vector)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryItem>> {
        let id = id.to_string();
        self.with_reader(move |conn| {
            let item = conn
                .query_row(
                    &format!("SELECT {} FROM memories WHERE id = ?1", ITEM_COLUMNS),
                    params![id],
                    row_to_item,
                )
                .optional()?;
            Ok(item)
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_writer(move |conn| {
            // memory_vectors rows cascade
            let changed = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
        .await
    }

    async fn list(&self, filter: &MemoryFilter) -> Result<Vec<MemoryItem>> {
        let filter = filter.clone();
        self.with_reader(move |conn| {
            let (where_sql, mut values) = where_clause(&filter);
            let limit = filter
                .limit
                .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
                .unwrap_or(-1);
            values.push(Value::Integer(limit));
            values.push(Value::Integer(i64::try_from(filter.offset).unwrap_or(i64::MAX)));

            let sql = format!(
                "SELECT {} FROM memories{}{} LIMIT ? OFFSET ?",
                ITEM_COLUMNS,
                where_sql,
                order_clause(filter.sort)
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(params_from_iter(values.iter()), row_to_item)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(items)
        })
        .await
    }

    async fn count(&self, filter: &MemoryFilter) -> Result<usize> {
        let filter = filter.clone();
        self.with_reader(move |conn| {
            let (where_sql, values) = where_clause(&filter);
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM memories{}", where_sql),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }

    async fn get_vector(&self, id: &str) -> Result<Option<StoredVector>> {
        let id = id.to_string();
        self.with_reader(move |conn| {
            let vector = conn
                .query_row(
                    "SELECT memory_id, model, vector FROM memory_vectors WHERE memory_id = ?1",
                    params![id],
                    row_to_vector,
                )
                .optional()?;
            Ok(vector)
        })
        .await
    }

    async fn vectors(&self) -> Result<Vec<StoredVector>> {
        self.with_reader(|conn| {
            let mut stmt = conn
                .prepare("SELECT memory_id, model, vector FROM memory_vectors ORDER BY memory_id")?;
            let vectors = stmt
                .query_map([], row_to_vector)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(vectors)
        })
        .await
    }

    async fn ids_without_vector(&self) -> Result<Vec<String>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id FROM memories m
                 LEFT JOIN memory_vectors v ON v.memory_id = m.id
                 WHERE v.memory_id IS NULL
                 ORDER BY m.id",
            )?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn record_consolidation(&self, report: &ConsolidationReport) -> Result<()> {
        let json = serde_json::to_string(report)?;
        let completed_at = format_timestamp(report.completed_at.unwrap_or_else(Utc::now));
        let duration_ms = report.duration_ms;
        let threshold = report.threshold;
        let clusters = i64::try_from(report.clusters_found).unwrap_or(i64::MAX);
        let merged = i64::try_from(report.memories_merged).unwrap_or(i64::MAX);
        let after = i64::try_from(report.memories_after).unwrap_or(i64::MAX);

        self.with_writer(move |conn| {
            conn.execute(
                "INSERT INTO consolidation_history
                    (completed_at, duration_ms, threshold, clusters_found, memories_merged,
                     memories_after, report)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![completed_at, duration_ms, threshold, clusters, merged, after, json],
            )?;
            Ok(())
        })
        .await
    }

    async fn last_consolidation(&self) -> Result<Option<DateTime<Utc>>> {
        self.with_reader(|conn| {
            let raw: Option<String> = conn.query_row(
                "SELECT MAX(completed_at) FROM consolidation_history",
                [],
                |row| row.get(0),
            )?;
            raw.as_deref().map(parse_timestamp).transpose()
        })
        .await
    }
}
