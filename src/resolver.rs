//! Author name resolution against the dataset.
//!
//! A normalized name resolves to every author whose stored name is the base
//! name itself or one of its numbered DBLP variants. In fuzzy mode the
//! result is extended with full-text and substring matches.

use std::collections::HashSet;

use rusqlite::{params, Connection};

use crate::names::{base_name, is_base_variant};

/// How fuzzy matches are looked up on a given connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuzzyStrategy {
    /// `author_fts` is present: full-text match unioned with substring match
    FullText,
    /// No usable full-text index: substring match only
    SubstringOnly,
}

impl FuzzyStrategy {
    /// Decide the strategy for `conn` by checking for a queryable `author_fts`.
    #[must_use]
    pub fn probe(conn: &Connection) -> Self {
        let exists = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'author_fts'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)
            .unwrap_or(false);
        if !exists {
            return Self::SubstringOnly;
        }

        match conn.prepare("SELECT rowid FROM author_fts WHERE author_fts MATCH ?1 LIMIT 0") {
            Ok(_) => Self::FullText,
            Err(e) => {
                log::debug!("author_fts present but not queryable: {}", e);
                Self::SubstringOnly
            }
        }
    }
}

/// Quote every token so user input is matched literally by FTS. Tokens
/// without any alphanumeric character are dropped.
fn fts_query(normalized: &str) -> String {
    normalized
        .split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves normalized names to author IDs over one connection.
pub struct AuthorResolver<'a> {
    conn: &'a Connection,
    strategy: FuzzyStrategy,
}

impl<'a> AuthorResolver<'a> {
    #[must_use]
    pub fn new(conn: &'a Connection, strategy: FuzzyStrategy) -> Self {
        Self { conn, strategy }
    }

    /// Resolve `normalized` to a de-duplicated list of author IDs.
    ///
    /// Base-variant matches come first. With `exact_base_match` they are the
    /// whole answer and `limit` is ignored. Otherwise fuzzy matches, bounded
    /// by `limit`, are appended.
    pub fn resolve(
        &self,
        normalized: &str,
        limit: Option<u32>,
        exact_base_match: bool,
    ) -> rusqlite::Result<Vec<i64>> {
        let exact = self.base_variants(normalized)?;
        if exact_base_match {
            return Ok(exact);
        }

        let fuzzy = self.fuzzy(normalized, limit)?;
        let mut seen = HashSet::new();
        Ok(exact
            .into_iter()
            .chain(fuzzy)
            .filter(|id| seen.insert(*id))
            .collect())
    }

    fn base_variants(&self, normalized: &str) -> rusqlite::Result<Vec<i64>> {
        let base = base_name(normalized);
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, name FROM authors WHERE name = ?1 OR name LIKE ?2 ORDER BY id")?;
        let rows = stmt.query_map(params![base, format!("{base} %")], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut ids = Vec::new();
        for row in rows {
            let (id, name) = row?;
            if is_base_variant(&name, base) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn fuzzy(&self, normalized: &str, limit: Option<u32>) -> rusqlite::Result<Vec<i64>> {
        let pattern = format!("%{normalized}%");
        let limit = limit.map_or(-1, i64::from);
        let match_expr = fts_query(normalized);

        let ids = if self.strategy == FuzzyStrategy::FullText && !match_expr.is_empty() {
            let mut stmt = self.conn.prepare_cached(
                "SELECT a.id FROM author_fts af
                 JOIN authors a ON a.id = af.rowid
                 WHERE author_fts MATCH ?1
                 UNION
                 SELECT a.id FROM authors a WHERE a.name LIKE ?2
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![match_expr, pattern, limit], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<i64>>>()?
        } else {
            let mut stmt = self
                .conn
                .prepare_cached("SELECT a.id FROM authors a WHERE a.name LIKE ?1 LIMIT ?2")?;
            let rows = stmt.query_map(params![pattern, limit], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<i64>>>()?
        };
        Ok(ids)
    }
}
