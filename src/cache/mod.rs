//! Result caching for author resolution and pair publication lookups.
//!
//! Resolving a name against the full DBLP author table and joining two author
//! ID sets through `pub_authors` are the two expensive steps of a pair query.
//! Both results are persisted in a separate SQLite file so that repeated
//! queries across processes are served without touching the dataset.
//!
//! # Architecture
//!
//! * [`database`]: SQLite persistence, per-table connections, maintenance.
//! * [`entry`]: Stored row model, statistics and payload decoding.
//! * [`key`]: Content-addressed key construction.
//!
//! # Cache Invalidation
//!
//! Keys embed the dataset size and modification time. A rebuilt dataset
//! produces new keys, so stale rows are never read. They stay on disk until
//! [`CacheStore::prune_stale`] removes them.

pub mod database;
pub mod entry;
pub mod key;

pub use database::{CacheError, CacheResult, CacheStore};
pub use entry::{CacheEntry, CacheStats, CacheTable, TableStats};
