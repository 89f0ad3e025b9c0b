//! Read-only access to the DBLP dataset.
//!
//! A [`Dataset`] wraps one short-lived connection, opened per request and
//! dropped when the request ends. It never writes to the file.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rusqlite::{params_from_iter, types::Value, Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::resolver::{AuthorResolver, FuzzyStrategy};

/// Tables every usable dataset must contain.
pub const REQUIRED_TABLES: [&str; 3] = ["publications", "authors", "pub_authors"];

/// Columns of `publications` produced by the `fullmeta` ingestion mode.
pub const FULLMETA_PUBLICATION_COLUMNS: [&str; 6] =
    ["id", "title", "year", "venue", "pub_type", "raw_xml"];

/// One co-authored publication as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub title: String,
    pub year: Option<i64>,
    pub venue: Option<String>,
    pub pub_type: Option<String>,
}

/// Row counts of the main dataset tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetCounts {
    pub publications: i64,
    pub authors: i64,
}

/// An open, read-only dataset connection.
pub struct Dataset {
    conn: Connection,
    fuzzy: FuzzyStrategy,
}

impl Dataset {
    /// Open the dataset at `path` read-only.
    ///
    /// The full-text capability probe runs once here and is reused by every
    /// resolver created from this connection.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Unavailable`] when the file cannot be opened.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, QueryError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| QueryError::Unavailable(format!("Cannot open database: {e}")))?;
        conn.busy_timeout(busy_timeout.max(Duration::from_secs(1)))
            .map_err(|e| QueryError::Unavailable(format!("Cannot open database: {e}")))?;
        conn.execute_batch("PRAGMA temp_store = MEMORY;")
            .map_err(|e| QueryError::Unavailable(format!("Cannot open database: {e}")))?;

        let fuzzy = FuzzyStrategy::probe(&conn);
        log::trace!("Opened dataset {} ({:?})", path.display(), fuzzy);
        Ok(Self { conn, fuzzy })
    }

    /// Verify that the dataset has the tables and columns queries rely on.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::SchemaIncomplete`] naming what is missing, or
    /// [`QueryError::Database`] if the catalog cannot be read.
    pub fn ensure_schema(&self) -> Result<(), QueryError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        if !REQUIRED_TABLES.iter().all(|t| tables.contains(*t)) {
            return Err(QueryError::SchemaIncomplete(
                "Database schema is incomplete.".to_string(),
            ));
        }

        let mut stmt = self.conn.prepare("PRAGMA table_info(publications)")?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        let mut missing: Vec<&str> = FULLMETA_PUBLICATION_COLUMNS
            .iter()
            .copied()
            .filter(|c| !columns.contains(*c))
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            return Err(QueryError::SchemaIncomplete(format!(
                "Current database is not fullmeta-compatible. Missing columns: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Fuzzy strategy decided by the capability probe.
    #[must_use]
    pub fn fuzzy_strategy(&self) -> FuzzyStrategy {
        self.fuzzy
    }

    /// Author resolver bound to this connection.
    #[must_use]
    pub fn resolver(&self) -> AuthorResolver<'_> {
        AuthorResolver::new(&self.conn, self.fuzzy)
    }

    /// Publications co-authored by any author of `left_ids` and any author
    /// of `right_ids`.
    ///
    /// Results are distinct, dated publications first (newest first), then
    /// undated ones, ties broken by title.
    pub fn pair_publications(
        &self,
        left_ids: &[i64],
        right_ids: &[i64],
        year_min: Option<i32>,
        limit: Option<u32>,
    ) -> rusqlite::Result<Vec<Publication>> {
        if left_ids.is_empty() || right_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT DISTINCT p.title, p.year, p.venue, p.pub_type
             FROM pub_authors pa1
             JOIN pub_authors pa2 ON pa1.pub_id = pa2.pub_id
             JOIN publications p ON p.id = pa1.pub_id
             WHERE pa1.author_id IN ({})
               AND pa2.author_id IN ({})",
            placeholders(left_ids.len()),
            placeholders(right_ids.len())
        );

        let mut values: Vec<Value> = left_ids
            .iter()
            .chain(right_ids)
            .map(|&id| Value::Integer(id))
            .collect();
        if let Some(year) = year_min {
            sql.push_str(" AND p.year >= ?");
            values.push(Value::Integer(i64::from(year)));
        }
        sql.push_str(" ORDER BY (p.year IS NULL) ASC, p.year DESC, p.title ASC");
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(i64::from(limit)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok(Publication {
                title: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                year: row.get(1)?,
                venue: row.get(2)?,
                pub_type: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    /// Number of publications and authors.
    pub fn counts(&self) -> rusqlite::Result<DatasetCounts> {
        let publications = self
            .conn
            .query_row("SELECT COUNT(*) FROM publications", [], |row| row.get(0))?;
        let authors = self
            .conn
            .query_row("SELECT COUNT(*) FROM authors", [], |row| row.get(0))?;
        Ok(DatasetCounts {
            publications,
            authors,
        })
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}
