//! In-memory memoization of health probes and dataset statistics.
//!
//! Both values are cheap to keep and expensive enough to recompute (opening
//! the dataset, counting rows) that bursts of status requests should not hit
//! SQLite each time. Memoized values are tied to the dataset signature.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{ErrorStatus, QueryError};
use crate::signature::DbSignature;

/// Label reported as the statistics source.
pub const DATA_SOURCE: &str = "DBLP";

struct Slot<T> {
    sig: DbSignature,
    expires_at: Option<Instant>,
    value: T,
}

/// A single memoized value keyed by dataset signature, with an optional TTL.
///
/// The lock is held while the value is computed, so concurrent callers with
/// the same signature wait for one computation instead of repeating it.
pub struct SignatureMemo<T> {
    ttl: Option<Duration>,
    slot: Mutex<Option<Slot<T>>>,
}

impl<T: Clone> SignatureMemo<T> {
    /// Memo valid until the signature changes.
    #[must_use]
    pub fn until_changed() -> Self {
        Self {
            ttl: None,
            slot: Mutex::new(None),
        }
    }

    /// Memo valid until the signature changes or `ttl` elapses.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            slot: Mutex::new(None),
        }
    }

    /// Return the memoized value for `sig`, or compute and store it.
    ///
    /// The boolean is `true` on a memo hit. Errors from `compute` are
    /// returned without being stored.
    pub fn get_or_try_insert_with<E>(
        &self,
        sig: &DbSignature,
        compute: impl FnOnce() -> Result<T, E>,
    ) -> Result<(T, bool), E> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        if let Some(current) = slot.as_ref() {
            let fresh = current.expires_at.map_or(true, |at| now < at);
            if current.sig == *sig && fresh {
                return Ok((current.value.clone(), true));
            }
        }

        let value = compute()?;
        *slot = Some(Slot {
            sig: sig.clone(),
            expires_at: self.ttl.and_then(|ttl| now.checked_add(ttl)),
            value: value.clone(),
        });
        Ok((value, false))
    }

    /// Infallible form of [`get_or_try_insert_with`](Self::get_or_try_insert_with).
    pub fn get_or_insert_with(&self, sig: &DbSignature, compute: impl FnOnce() -> T) -> (T, bool) {
        match self.get_or_try_insert_with(sig, || Ok::<T, std::convert::Infallible>(compute())) {
            Ok(found) => found,
            Err(never) => match never {},
        }
    }
}

/// Memoized result of a health probe. Failures are memoized too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthOutcome {
    pub failure: Option<(ErrorStatus, String)>,
}

impl HealthOutcome {
    #[must_use]
    pub fn ok() -> Self {
        Self { failure: None }
    }

    #[must_use]
    pub fn from_error(err: &QueryError) -> Self {
        Self {
            failure: Some((err.status(), err.to_string())),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    /// `"ok"` or `"error"`
    pub status: &'static str,
    pub http_status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Whether the answer came from the memo
    pub cache_hit: bool,
}

impl HealthReport {
    #[must_use]
    pub fn from_outcome(outcome: &HealthOutcome, cache_hit: bool) -> Self {
        match &outcome.failure {
            None => Self {
                healthy: true,
                status: "ok",
                http_status: 200,
                detail: None,
                cache_hit,
            },
            Some((status, detail)) => Self {
                healthy: false,
                status: "error",
                http_status: status.http_code(),
                detail: Some(detail.clone()),
                cache_hit,
            },
        }
    }
}

/// Dataset statistics response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetStats {
    pub publications: i64,
    pub authors: i64,
    pub data_source: String,
    pub data_date: String,
}
