//! SQLite-backed fragment store.
//!
//! Persists fragment records in a single table keyed by id, with indices on
//! owner and pending status. The connection is opened lazily on first use.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::store::FragmentStore;
use fragments_common::{Error, FragmentId, FragmentRecord, OwnerId, Result};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS fragments (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        created TEXT NOT NULL,
        updated TEXT NOT NULL,
        type TEXT NOT NULL,
        size INTEGER NOT NULL,
        pending_sync INTEGER NOT NULL,
        data BLOB NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_fragments_owner ON fragments(owner_id);
    CREATE INDEX IF NOT EXISTS idx_fragments_pending ON fragments(owner_id, pending_sync);
"#;

const COLUMNS: &str = "id, owner_id, created, updated, type, size, pending_sync, data";

type SharedConnection = Arc<Mutex<Connection>>;

/// Fragment store on a local SQLite database file.
///
/// The database is opened on first use. Concurrent first calls share a
/// single open; if opening fails every call reports `StorageUnavailable`
/// and the next call tries again.
pub struct SqliteStore {
    path: PathBuf,
    conn: OnceCell<SharedConnection>,
}

impl SqliteStore {
    /// Create a store for the database at `path`. Nothing is opened yet.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            conn: OnceCell::new(),
        }
    }

    /// Create a store on a private in-memory database (for testing).
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    /// Database location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the connection has been opened.
    pub fn is_open(&self) -> bool {
        self.conn.initialized()
    }

    /// Open the database now instead of on first use.
    pub async fn open(&self) -> Result<()> {
        self.handle().await.map(|_| ())
    }

    async fn handle(&self) -> Result<SharedConnection> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let path = self.path.clone();
                tokio::task::spawn_blocking(move || open_connection(&path))
                    .await
                    .map_err(|e| Error::StorageUnavailable(format!("Open task failed: {}", e)))?
            })
            .await?;
        Ok(conn.clone())
    }

    /// Run a blocking closure against the open connection.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.handle().await?;
        tokio::task::spawn_blocking(move || {
            let mut conn = handle
                .lock()
                .map_err(|_| Error::Storage("Connection lock poisoned".to_string()))?;
            f(&mut conn).map_err(|e| Error::Storage(e.to_string()))
        })
        .await
        .map_err(|e| Error::Storage(format!("Storage task failed: {}", e)))?
    }
}

fn open_connection(path: &Path) -> Result<SharedConnection> {
    let unavailable = |e: &dyn std::fmt::Display| {
        Error::StorageUnavailable(format!("{}: {}", path.display(), e))
    };

    if path != Path::new(":memory:") {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(&e))?;
        }
    }

    let conn = Connection::open(path).map_err(|e| unavailable(&e))?;
    conn.execute_batch(SCHEMA).map_err(|e| unavailable(&e))?;

    info!("Fragment store opened at {}", path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FragmentRecord> {
    let id = FragmentId::new(row.get::<_, String>(0)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    let owner_id = OwnerId::new(row.get::<_, String>(1)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(FragmentRecord {
        id,
        owner_id,
        created: parse_time(row, 2)?,
        updated: parse_time(row, 3)?,
        fragment_type: row.get(4)?,
        size: row.get::<_, i64>(5)? as u64,
        pending_sync: row.get::<_, i64>(6)? != 0,
        data: row.get(7)?,
    })
}

fn upsert(conn: &Connection, record: &FragmentRecord) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO fragments
        (id, owner_id, created, updated, type, size, pending_sync, data)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            record.id.as_str(),
            record.owner_id.as_str(),
            format_time(&record.created),
            format_time(&record.updated),
            record.fragment_type,
            record.size as i64,
            record.pending_sync as i64,
            record.data,
        ],
    )?;
    Ok(())
}

fn query_records(
    conn: &Connection,
    sql: &str,
    owner: &str,
) -> rusqlite::Result<Vec<FragmentRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([owner], row_to_record)?;
    rows.collect()
}

#[async_trait]
impl FragmentStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save(&self, record: &FragmentRecord) -> Result<FragmentId> {
        debug!("Saving fragment {}", record.id);
        let record = record.clone();
        self.with_conn(move |conn| {
            upsert(conn, &record)?;
            Ok(record.id)
        })
        .await
    }

    async fn get(&self, id: &FragmentId) -> Result<Option<FragmentRecord>> {
        let id = id.as_str().to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM fragments WHERE id = ?1", COLUMNS),
                [id],
                row_to_record,
            )
            .optional()
        })
        .await
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<FragmentRecord>> {
        let owner = owner.as_str().to_string();
        self.with_conn(move |conn| {
            query_records(
                conn,
                &format!("SELECT {} FROM fragments WHERE owner_id = ?1", COLUMNS),
                &owner,
            )
        })
        .await
    }

    async fn delete(&self, id: &FragmentId) -> Result<()> {
        debug!("Deleting fragment {}", id);
        let id = id.as_str().to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM fragments WHERE id = ?1", [id])?;
            Ok(())
        })
        .await
    }

    async fn list_pending_by_owner(&self, owner: &OwnerId) -> Result<Vec<FragmentRecord>> {
        let owner = owner.as_str().to_string();
        self.with_conn(move |conn| {
            query_records(
                conn,
                &format!(
                    "SELECT {} FROM fragments WHERE owner_id = ?1 AND pending_sync = 1",
                    COLUMNS
                ),
                &owner,
            )
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM fragments", [])?;
            Ok(())
        })
        .await
    }

    async fn reconcile(&self, old: &FragmentId, confirmed: &FragmentRecord) -> Result<()> {
        debug!("Reconciling fragment {} as {}", old, confirmed.id);
        let old = old.as_str().to_string();
        let confirmed = confirmed.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            upsert(&tx, &confirmed)?;
            if old != confirmed.id.as_str() {
                tx.execute("DELETE FROM fragments WHERE id = ?1", [old])?;
            }
            tx.commit()
        })
        .await
    }
}
