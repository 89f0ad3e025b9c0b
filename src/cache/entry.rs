//! Cache entry definitions and payload decoding.

use serde::{Deserialize, Serialize};

use super::database::{CacheError, CacheResult};
use crate::dataset::Publication;

/// The two independent cache tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTable {
    /// Normalized author name → author IDs
    AuthorResolve,
    /// Canonical ID-set pair → publications
    PairPublications,
}

impl CacheTable {
    /// Both tables, in schema order.
    pub const ALL: [CacheTable; 2] = [CacheTable::AuthorResolve, CacheTable::PairPublications];

    /// SQL table name.
    #[must_use]
    pub fn table_name(self) -> &'static str {
        match self {
            Self::AuthorResolve => "author_resolve_cache",
            Self::PairPublications => "pair_pubs_cache",
        }
    }

    /// Name of the JSON payload column.
    #[must_use]
    pub(crate) fn payload_column(self) -> &'static str {
        match self {
            Self::AuthorResolve => "ids_json",
            Self::PairPublications => "items_json",
        }
    }
}

/// A stored row, as returned by [`CacheStore::entry`](super::CacheStore::entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    /// Content-addressed key (SHA-256 hex)
    pub key: String,
    /// Dataset size recorded at insert time
    pub db_size: i64,
    /// Dataset mtime recorded at insert time
    pub db_mtime_ns: i64,
    /// Raw JSON payload
    pub payload: String,
    /// RFC 3339 creation time
    pub created_at: String,
    /// RFC 3339 time of the last read or overwrite
    pub last_accessed: String,
    /// Number of cache hits served
    pub hit_count: i64,
}

/// Row counts and hit totals for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    /// Number of stored entries
    pub entries: u64,
    /// Sum of `hit_count` over all entries
    pub hits: u64,
}

/// Statistics for the whole cache store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Author-resolution table
    pub author_resolve: TableStats,
    /// Pair-publication table
    pub pair_publications: TableStats,
}

/// Decode an author-ID payload. Anything but a JSON array of integers is corrupt.
pub(crate) fn decode_ids(payload: &str) -> CacheResult<Vec<i64>> {
    serde_json::from_str::<Vec<i64>>(payload)
        .map_err(|e| CacheError::Corrupt(format!("author id payload: {e}")))
}

/// Decode a publication-list payload.
pub(crate) fn decode_items(payload: &str) -> CacheResult<Vec<Publication>> {
    serde_json::from_str::<Vec<Publication>>(payload)
        .map_err(|e| CacheError::Corrupt(format!("publication payload: {e}")))
}
