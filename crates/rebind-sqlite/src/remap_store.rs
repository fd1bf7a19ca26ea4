//! SQLite persistence for remap tables.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rebind_core::{CanonicalKey, RebindError, RebindResult, RemapEntry, RemapTable};

use crate::db_error;

/// One persisted binding.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLink {
    /// Model kind.
    pub model: String,
    /// Canonical source key.
    pub key: CanonicalKey,
    /// Minted identifier.
    pub id: String,
    /// When the binding was last written.
    pub linked_at: DateTime<Utc>,
}

/// Keeps remap bindings in a SQLite table so identifiers survive restarts.
pub struct SqliteRemapStore {
    conn: Mutex<Connection>,
}

impl SqliteRemapStore {
    /// Open (or create) a store at `db_path`. `":memory:"` opens a private
    /// in-memory database.
    pub fn open(db_path: impl AsRef<Path>) -> RebindResult<Self> {
        let path = db_path.as_ref();
        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path)
        }
        .map_err(db_error)?;

        Self::with_connection(conn)
    }

    /// Open a private in-memory store.
    pub fn in_memory() -> RebindResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> RebindResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_table()?;
        Ok(store)
    }

    fn conn(&self) -> RebindResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RebindError::Internal("remap store lock poisoned".to_string()))
    }

    fn create_table(&self) -> RebindResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS remap_links (
                model       TEXT NOT NULL,
                source_key  TEXT NOT NULL,
                target_id   TEXT NOT NULL,
                linked_at   TEXT NOT NULL,
                PRIMARY KEY (model, source_key)
            )
            "#,
            [],
        )
        .map_err(db_error)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_remap_links_target ON remap_links(target_id)",
            [],
        )
        .map_err(db_error)?;

        Ok(())
    }

    /// Every stored binding, optionally restricted to one model kind.
    pub fn list(&self, model: Option<&str>) -> RebindResult<Vec<StoredLink>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT model, source_key, target_id, linked_at FROM remap_links \
                 WHERE (?1 IS NULL OR model = ?1) ORDER BY model, source_key",
            )
            .map_err(db_error)?;

        let rows = stmt
            .query_map(params![model], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;

        rows.into_iter()
            .map(|(model, source_key, id, linked_at)| {
                let key: CanonicalKey = serde_json::from_str(&source_key)?;
                let linked_at = DateTime::parse_from_rfc3339(&linked_at)
                    .map_err(|e| {
                        RebindError::database(format!("bad timestamp for {}: {}", model, e))
                    })?
                    .with_timezone(&Utc);
                Ok(StoredLink {
                    model,
                    key,
                    id,
                    linked_at,
                })
            })
            .collect()
    }

    /// Load every binding into a fresh table.
    pub fn load(&self) -> RebindResult<RemapTable> {
        let links = self.list(None)?;
        tracing::debug!(bindings = links.len(), "Loaded remap bindings");
        Ok(RemapTable::from_entries(links.into_iter().map(|link| RemapEntry {
            model: link.model,
            key: link.key,
            id: link.id,
        })))
    }

    /// Write every binding of `table`; returns how many rows were inserted or changed.
    pub fn save(&self, table: &RemapTable) -> RebindResult<usize> {
        let entries = table.entries();
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_error)?;
        let mut written = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO remap_links (model, source_key, target_id, linked_at) \
                     VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT(model, source_key) DO UPDATE SET \
                         target_id = excluded.target_id, linked_at = excluded.linked_at \
                     WHERE remap_links.target_id <> excluded.target_id",
                )
                .map_err(db_error)?;

            for entry in &entries {
                let key = serde_json::to_string(&entry.key)?;
                written += stmt
                    .execute(params![entry.model, key, entry.id, now])
                    .map_err(db_error)?;
            }
        }
        tx.commit().map_err(db_error)?;

        tracing::debug!(total = entries.len(), written, "Saved remap bindings");
        Ok(written)
    }

    /// Number of stored bindings.
    pub fn len(&self) -> RebindResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM remap_links", [], |row| row.get(0))
            .map_err(db_error)?;
        Ok(count as usize)
    }

    /// Whether the store holds no bindings.
    pub fn is_empty(&self) -> RebindResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Identifier stored for a source key, if any.
    pub fn get(&self, model: &str, key: &CanonicalKey) -> RebindResult<Option<String>> {
        let conn = self.conn()?;
        let source_key = serde_json::to_string(key)?;
        let id = conn
            .query_row(
                "SELECT target_id FROM remap_links WHERE model = ?1 AND source_key = ?2",
                params![model, source_key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(db_error)?;
        Ok(id)
    }
}

impl std::fmt::Debug for SqliteRemapStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRemapStore").finish_non_exhaustive()
    }
}
