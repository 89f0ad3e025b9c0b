//! Database file signature used as the cache-validity token.
//!
//! A [`DbSignature`] is a cheap fingerprint of the on-disk dataset: its path,
//! size and modification time. Every cache key embeds the size and mtime, so
//! rebuilding the dataset changes the keys and orphans old entries without any
//! explicit invalidation step.
//!
//! The signature is always read fresh from the filesystem. It is never cached.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

use crate::error::QueryError;

/// Fingerprint of the dataset file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbSignature {
    /// Path the metadata was read from
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch
    pub mtime_ns: i64,
}

impl DbSignature {
    /// Read the signature of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Unavailable`] if the file is missing or its
    /// metadata cannot be read.
    pub fn read(path: &Path) -> Result<Self, QueryError> {
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                QueryError::Unavailable("Database file is not available.".to_string())
            }
            _ => QueryError::Unavailable(format!("Cannot stat database file: {e}")),
        })?;
        let modified = metadata
            .modified()
            .map_err(|e| QueryError::Unavailable(format!("Cannot stat database file: {e}")))?;

        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
            mtime_ns: system_time_to_ns(modified),
        })
    }

    /// Modification date as `YYYY-MM-DD` in UTC.
    #[must_use]
    pub fn data_date(&self) -> String {
        DateTime::<Utc>::from_timestamp_nanos(self.mtime_ns)
            .format("%Y-%m-%d")
            .to_string()
    }
}

/// Nanoseconds since the Unix epoch, negative for earlier times.
fn system_time_to_ns(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_nanos())
            .map(|ns| -ns)
            .unwrap_or(i64::MIN),
    }
}
