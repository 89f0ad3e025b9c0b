//! SQLite-backed result cache.
//!
//! Each table is reached through one long-lived connection guarded by its own
//! mutex. Connections are opened lazily and dropped after any failed
//! operation, so the next call starts from a clean reconnect.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use super::entry::{decode_ids, decode_items, CacheEntry, CacheStats, CacheTable, TableStats};
use super::key::{author_key, pair_key};
use crate::dataset::Publication;
use crate::signature::DbSignature;

/// Schema version recorded in the `meta` table.
pub const SCHEMA_VERSION: &str = "1";

/// Smallest accepted payload ceiling in bytes.
pub const MIN_MAX_JSON_BYTES: usize = 10_000;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    INSERT OR IGNORE INTO meta(key, value) VALUES ('schema_version', '1');

    CREATE TABLE IF NOT EXISTS author_resolve_cache (
        key TEXT PRIMARY KEY,
        db_size INTEGER NOT NULL,
        db_mtime_ns INTEGER NOT NULL,
        query TEXT NOT NULL,
        exact_base_match INTEGER NOT NULL,
        limit_val INTEGER,
        ids_json TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_accessed TEXT NOT NULL,
        hit_count INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_author_resolve_db ON author_resolve_cache(db_mtime_ns, db_size);
    CREATE INDEX IF NOT EXISTS idx_author_resolve_query ON author_resolve_cache(query);

    CREATE TABLE IF NOT EXISTS pair_pubs_cache (
        key TEXT PRIMARY KEY,
        db_size INTEGER NOT NULL,
        db_mtime_ns INTEGER NOT NULL,
        limit_per_pair INTEGER,
        year_min INTEGER,
        items_json TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_accessed TEXT NOT NULL,
        hit_count INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_pair_pubs_db ON pair_pubs_cache(db_mtime_ns, db_size);
";

/// Errors from the cache layer.
///
/// Callers in the query path log these and fall back to the dataset.
#[derive(Debug, Error)]
pub enum CacheError {
    /// SQLite failure while opening or using a cache connection.
    #[error("Cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The payload could not be serialized.
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The cache directory could not be created.
    #[error("Cache I/O error for {path}: {source}")]
    Io {
        /// Directory that could not be created
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A stored payload is not in the expected shape.
    #[error("Corrupt cache payload: {0}")]
    Corrupt(String),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// One cache table and the serialized connection that reaches it.
struct TableConnection {
    table: CacheTable,
    path: PathBuf,
    busy_timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl TableConnection {
    fn new(table: CacheTable, path: PathBuf, busy_timeout: Duration) -> Self {
        Self {
            table,
            path,
            busy_timeout,
            conn: Mutex::new(None),
        }
    }

    fn open(&self) -> CacheResult<Connection> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        // WAL may be unavailable on some filesystems; the cache still works without it.
        if let Err(e) = conn.query_row("PRAGMA journal_mode = WAL", [], |row| {
            row.get::<_, String>(0)
        }) {
            log::debug!("Cache {}: WAL unavailable: {}", self.path.display(), e);
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA temp_store = MEMORY;")?;
        conn.execute_batch(SCHEMA)?;
        log::debug!(
            "Opened cache connection for {} at {}",
            self.table.table_name(),
            self.path.display()
        );
        Ok(conn)
    }

    /// Run `f` with exclusive access to this table's connection.
    ///
    /// A failed operation drops the connection instead of returning it to
    /// the slot. Open transactions roll back when dropped.
    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> CacheResult<T>) -> CacheResult<T> {
        let mut slot = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.open()?,
        };

        match f(&mut conn) {
            Ok(value) => {
                *slot = Some(conn);
                Ok(value)
            }
            Err(e) => {
                log::debug!(
                    "Dropping cache connection for {} after error: {}",
                    self.table.table_name(),
                    e
                );
                drop(conn);
                Err(e)
            }
        }
    }

    /// Fetch a payload and bump its bookkeeping in one critical section.
    fn get_payload(&self, key: &str) -> CacheResult<Option<String>> {
        let table = self.table.table_name();
        let column = self.table.payload_column();
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let payload: Option<String> = {
                let mut stmt = tx.prepare_cached(&format!("SELECT {column} FROM {table} WHERE key = ?1"))?;
                stmt.query_row(params![key], |row| row.get(0)).optional()?
            };
            if payload.is_some() {
                tx.execute(
                    &format!(
                        "UPDATE {table} SET last_accessed = ?1, hit_count = hit_count + 1 WHERE key = ?2"
                    ),
                    params![now_rfc3339(), key],
                )?;
            }
            tx.commit()?;
            Ok(payload)
        })
    }

    fn close(&self) {
        let mut slot = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(conn) = slot.take() {
            if let Err((_, e)) = conn.close() {
                log::warn!("Failed to close cache connection: {}", e);
            }
        }
    }
}

/// Persistent cache for author resolutions and pair publication lists.
///
/// Entries are keyed by a digest that embeds the dataset signature, so a
/// rebuilt dataset never sees results computed against the previous one.
pub struct CacheStore {
    path: PathBuf,
    max_json_bytes: usize,
    authors: TableConnection,
    pairs: TableConnection,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("path", &self.path)
            .field("max_json_bytes", &self.max_json_bytes)
            .finish()
    }
}

impl CacheStore {
    /// Create a cache store backed by the SQLite file at `path`.
    ///
    /// No connection is opened until the first operation. Payloads whose
    /// JSON exceeds `max_json_bytes` (floored at [`MIN_MAX_JSON_BYTES`]) are
    /// not stored.
    #[must_use]
    pub fn new(path: &Path, busy_timeout: Duration, max_json_bytes: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            max_json_bytes: max_json_bytes.max(MIN_MAX_JSON_BYTES),
            authors: TableConnection::new(CacheTable::AuthorResolve, path.to_path_buf(), busy_timeout),
            pairs: TableConnection::new(CacheTable::PairPublications, path.to_path_buf(), busy_timeout),
        }
    }

    /// Path of the cache database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Effective payload ceiling in bytes.
    #[must_use]
    pub fn max_json_bytes(&self) -> usize {
        self.max_json_bytes
    }

    fn table(&self, table: CacheTable) -> &TableConnection {
        match table {
            CacheTable::AuthorResolve => &self.authors,
            CacheTable::PairPublications => &self.pairs,
        }
    }

    /// Look up cached author IDs.
    ///
    /// A corrupt payload is logged and reported as a miss.
    pub fn get_author_ids(
        &self,
        sig: &DbSignature,
        query: &str,
        exact_base_match: bool,
        limit: Option<u32>,
    ) -> CacheResult<Option<Vec<i64>>> {
        let key = author_key(sig, query, exact_base_match, limit);
        let Some(payload) = self.authors.get_payload(&key)? else {
            return Ok(None);
        };
        match decode_ids(&payload) {
            Ok(ids) => Ok(Some(ids)),
            Err(e) => {
                log::warn!("Ignoring cached author ids for {:?}: {}", query, e);
                Ok(None)
            }
        }
    }

    /// Store author IDs. Returns `false` when the payload was too large.
    pub fn put_author_ids(
        &self,
        sig: &DbSignature,
        query: &str,
        exact_base_match: bool,
        limit: Option<u32>,
        ids: &[i64],
    ) -> CacheResult<bool> {
        let payload = serde_json::to_string(ids)?;
        if payload.len() > self.max_json_bytes {
            log::debug!(
                "Skipping author cache write for {:?}: {} bytes exceeds {}",
                query,
                payload.len(),
                self.max_json_bytes
            );
            return Ok(false);
        }

        let key = author_key(sig, query, exact_base_match, limit);
        let now = now_rfc3339();
        self.authors.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO author_resolve_cache(
                    key, db_size, db_mtime_ns, query, exact_base_match, limit_val,
                    ids_json, created_at, last_accessed, hit_count
                 )
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, 0)
                 ON CONFLICT(key) DO UPDATE SET
                    ids_json = excluded.ids_json,
                    last_accessed = excluded.last_accessed",
                params![
                    key,
                    sig.size as i64,
                    sig.mtime_ns,
                    query,
                    exact_base_match,
                    limit,
                    payload,
                    now
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Look up cached publications for a pair of ID sets.
    ///
    /// The lookup is symmetric in `left_ids` and `right_ids`.
    pub fn get_pair_items(
        &self,
        sig: &DbSignature,
        left_ids: &[i64],
        right_ids: &[i64],
        limit_per_pair: Option<u32>,
        year_min: Option<i32>,
    ) -> CacheResult<Option<Vec<Publication>>> {
        let key = pair_key(sig, left_ids, right_ids, limit_per_pair, year_min);
        let Some(payload) = self.pairs.get_payload(&key)? else {
            return Ok(None);
        };
        match decode_items(&payload) {
            Ok(items) => Ok(Some(items)),
            Err(e) => {
                log::warn!("Ignoring cached pair publications {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Store publications for a pair of ID sets. Returns `false` when the
    /// payload was too large.
    pub fn put_pair_items(
        &self,
        sig: &DbSignature,
        left_ids: &[i64],
        right_ids: &[i64],
        limit_per_pair: Option<u32>,
        year_min: Option<i32>,
        items: &[Publication],
    ) -> CacheResult<bool> {
        let payload = serde_json::to_string(items)?;
        if payload.len() > self.max_json_bytes {
            log::debug!(
                "Skipping pair cache write: {} bytes exceeds {}",
                payload.len(),
                self.max_json_bytes
            );
            return Ok(false);
        }

        let key = pair_key(sig, left_ids, right_ids, limit_per_pair, year_min);
        let now = now_rfc3339();
        self.pairs.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO pair_pubs_cache(
                    key, db_size, db_mtime_ns, limit_per_pair, year_min,
                    items_json, created_at, last_accessed, hit_count
                 )
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 0)
                 ON CONFLICT(key) DO UPDATE SET
                    items_json = excluded.items_json,
                    last_accessed = excluded.last_accessed",
                params![
                    key,
                    sig.size as i64,
                    sig.mtime_ns,
                    limit_per_pair,
                    year_min,
                    payload,
                    now
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Read a stored row without touching its bookkeeping.
    pub fn entry(&self, table: CacheTable, key: &str) -> CacheResult<Option<CacheEntry>> {
        let name = table.table_name();
        let column = table.payload_column();
        self.table(table).with_conn(|conn| {
            let entry = conn
                .query_row(
                    &format!(
                        "SELECT key, db_size, db_mtime_ns, {column}, created_at, last_accessed, hit_count
                         FROM {name} WHERE key = ?1"
                    ),
                    params![key],
                    |row| {
                        Ok(CacheEntry {
                            key: row.get(0)?,
                            db_size: row.get(1)?,
                            db_mtime_ns: row.get(2)?,
                            payload: row.get(3)?,
                            created_at: row.get(4)?,
                            last_accessed: row.get(5)?,
                            hit_count: row.get(6)?,
                        })
                    },
                )
                .optional()?;
            Ok(entry)
        })
    }

    /// Entry counts and hit totals for both tables.
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let read = |table: CacheTable| -> CacheResult<TableStats> {
            let name = table.table_name();
            self.table(table).with_conn(|conn| {
                let (entries, hits): (i64, i64) = conn.query_row(
                    &format!("SELECT COUNT(*), COALESCE(SUM(hit_count), 0) FROM {name}"),
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                Ok(TableStats {
                    entries: entries.max(0) as u64,
                    hits: hits.max(0) as u64,
                })
            })
        };

        Ok(CacheStats {
            author_resolve: read(CacheTable::AuthorResolve)?,
            pair_publications: read(CacheTable::PairPublications)?,
        })
    }

    /// Delete entries written under any signature other than `current`.
    ///
    /// Returns the number of deleted rows across both tables.
    pub fn prune_stale(&self, current: &DbSignature) -> CacheResult<usize> {
        self.delete_where(
            "NOT (db_mtime_ns = ?1 AND db_size = ?2)",
            params![current.mtime_ns, current.size as i64],
        )
    }

    /// Delete entries not read or written within `older_than`.
    ///
    /// Returns the number of deleted rows across both tables.
    pub fn prune_idle(&self, older_than: Duration) -> CacheResult<usize> {
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            return Ok(0);
        };
        let cutoff = cutoff.to_rfc3339_opts(SecondsFormat::Micros, true);
        self.delete_where("last_accessed < ?1", params![cutoff])
    }

    /// Delete every entry from both tables.
    pub fn clear(&self) -> CacheResult<usize> {
        self.delete_where("1 = 1", params![])
    }

    fn delete_where(&self, predicate: &str, params: &[&dyn rusqlite::ToSql]) -> CacheResult<usize> {
        let mut deleted = 0;
        for table in CacheTable::ALL {
            let name = table.table_name();
            deleted += self.table(table).with_conn(|conn| {
                let tx = conn.transaction()?;
                let n = tx.execute(&format!("DELETE FROM {name} WHERE {predicate}"), params)?;
                tx.commit()?;
                Ok(n)
            })?;
        }
        log::info!("Deleted {} cache entries from {}", deleted, self.path.display());
        Ok(deleted)
    }

    /// Close both table connections. Later operations reconnect.
    pub fn close(&self) {
        self.authors.close();
        self.pairs.close();
    }
}
