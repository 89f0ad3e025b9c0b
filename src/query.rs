//! Pair query orchestration.
//!
//! # Overview
//!
//! [`QueryEngine::compute_pair_matrix`] answers one co-authorship query:
//! 1. **Admission**: take a slot from the [`ConcurrencyGate`]
//! 2. **Sanitization**: parse and cap both author lists (no dataset access yet)
//! 3. **Resolution**: map every distinct name to author IDs, cache first
//! 4. **Pair lookup**: for each (left, right) pair, reuse a result from this
//!    request, then the cache, then join `pub_authors`
//!
//! # Example
//!
//! ```no_run
//! use coauthors::config::Config;
//! use coauthors::query::{PairQueryRequest, QueryEngine};
//!
//! let engine = QueryEngine::new(&Config::default());
//! let request = PairQueryRequest::new(vec!["Jane Doe".into()], vec!["Bob Roe".into()])
//!     .with_limit_per_pair(10);
//! let result = engine.compute_pair_matrix(&request)?;
//! println!("{} pairs", result.pair_count);
//! # Ok::<(), coauthors::error::QueryError>(())
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cache::key::pair_key;
use crate::cache::CacheStore;
use crate::config::{Config, QueryLimits};
use crate::dataset::{Dataset, Publication};
use crate::error::QueryError;
use crate::gate::ConcurrencyGate;
use crate::health::{DatasetStats, HealthOutcome, HealthReport, SignatureMemo, DATA_SOURCE};
use crate::names::sanitize_entries;
use crate::resolver::AuthorResolver;
use crate::signature::DbSignature;
use crate::telemetry::{emit, LogTelemetry, TelemetrySink};

/// Largest accepted `limit_per_pair` and `author_limit` in a request.
pub const MAX_REQUEST_LIMIT: u32 = 5000;

/// Accepted range of `year_min`.
pub const YEAR_MIN_RANGE: std::ops::RangeInclusive<i32> = 1900..=2100;

/// Response mode label.
pub const MODE: &str = "fullmeta";

fn default_exact_base_match() -> bool {
    true
}

/// A co-authorship query between two author lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairQueryRequest {
    #[serde(default)]
    pub left: Vec<String>,
    #[serde(default)]
    pub right: Vec<String>,
    /// Maximum publications returned per pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_per_pair: Option<u32>,
    /// Match base-name variants only; otherwise add fuzzy matches.
    #[serde(default = "default_exact_base_match")]
    pub exact_base_match: bool,
    /// Maximum fuzzy matches per name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_limit: Option<u32>,
    /// Only count publications from this year on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_min: Option<i32>,
}

impl Default for PairQueryRequest {
    fn default() -> Self {
        Self {
            left: Vec::new(),
            right: Vec::new(),
            limit_per_pair: None,
            exact_base_match: true,
            author_limit: None,
            year_min: None,
        }
    }
}

impl PairQueryRequest {
    #[must_use]
    pub fn new(left: Vec<String>, right: Vec<String>) -> Self {
        Self {
            left,
            right,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_limit_per_pair(mut self, limit: u32) -> Self {
        self.limit_per_pair = Some(limit);
        self
    }

    #[must_use]
    pub fn with_exact_base_match(mut self, exact: bool) -> Self {
        self.exact_base_match = exact;
        self
    }

    #[must_use]
    pub fn with_author_limit(mut self, limit: u32) -> Self {
        self.author_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_year_min(mut self, year: i32) -> Self {
        self.year_min = Some(year);
        self
    }

    /// Check field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRequest`] naming the first offending field.
    pub fn validate(&self) -> Result<(), QueryError> {
        let in_limit_range = |v: Option<u32>| v.map_or(true, |v| (1..=MAX_REQUEST_LIMIT).contains(&v));
        if !in_limit_range(self.limit_per_pair) {
            return Err(QueryError::InvalidRequest(format!(
                "limit_per_pair must be between 1 and {MAX_REQUEST_LIMIT}"
            )));
        }
        if !in_limit_range(self.author_limit) {
            return Err(QueryError::InvalidRequest(format!(
                "author_limit must be between 1 and {MAX_REQUEST_LIMIT}"
            )));
        }
        if let Some(year) = self.year_min {
            if !YEAR_MIN_RANGE.contains(&year) {
                return Err(QueryError::InvalidRequest(format!(
                    "year_min must be between {} and {}",
                    YEAR_MIN_RANGE.start(),
                    YEAR_MIN_RANGE.end()
                )));
            }
        }
        Ok(())
    }
}

/// Publications shared by one (left, right) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairPublications {
    pub left: String,
    pub right: String,
    pub count: usize,
    pub items: Vec<Publication>,
}

/// Count matrix in request order, serialized as `{left: {right: count}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairMatrix {
    rows: Vec<(String, Vec<(String, usize)>)>,
}

impl PairMatrix {
    fn push_row(&mut self, left: String, row: Vec<(String, usize)>) {
        self.rows.push((left, row));
    }

    /// Count for a pair, if both names are part of the matrix.
    #[must_use]
    pub fn get(&self, left: &str, right: &str) -> Option<usize> {
        self.rows
            .iter()
            .find(|(l, _)| l == left)
            .and_then(|(_, row)| row.iter().find(|(r, _)| r == right))
            .map(|(_, count)| *count)
    }

    /// Rows in left-author order.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &[(String, usize)])> {
        self.rows.iter().map(|(l, row)| (l.as_str(), row.as_slice()))
    }
}

struct MatrixRow<'a>(&'a [(String, usize)]);

impl Serialize for MatrixRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (right, count) in self.0 {
            map.serialize_entry(right, count)?;
        }
        map.end()
    }
}

impl Serialize for PairMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rows.len()))?;
        for (left, row) in &self.rows {
            map.serialize_entry(left, &MatrixRow(row))?;
        }
        map.end()
    }
}

/// Full answer to a pair query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairMatrixResult {
    pub mode: &'static str,
    /// Effective per-pair limit after clamping
    pub limit_per_pair: Option<u32>,
    pub exact_base_match: bool,
    pub left_authors: Vec<String>,
    pub right_authors: Vec<String>,
    pub matrix: PairMatrix,
    pub pair_pubs: Vec<PairPublications>,
    pub pair_count: usize,
}

impl PairMatrixResult {
    /// Number of pairs with at least one shared publication.
    #[must_use]
    pub fn coauthored_pair_count(&self) -> usize {
        self.pair_pubs.iter().filter(|p| p.count > 0).count()
    }
}

/// Shared query service.
///
/// One engine serves every caller of a process. It owns the cache store,
/// the gate and the health/stats memos. Dataset connections are opened per
/// request.
pub struct QueryEngine {
    db_path: PathBuf,
    db_busy_timeout: Duration,
    limits: QueryLimits,
    data_date: Option<String>,
    cache: CacheStore,
    gate: ConcurrencyGate,
    health: SignatureMemo<HealthOutcome>,
    stats: SignatureMemo<DatasetStats>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("db_path", &self.db_path)
            .field("limits", &self.limits)
            .field("cache", &self.cache)
            .field("gate", &self.gate)
            .finish()
    }
}

impl QueryEngine {
    /// Build an engine from configuration. Nothing is opened yet.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let limits = config.limits();
        Self {
            db_path: config.db_path(),
            db_busy_timeout: config.db_busy_timeout(),
            limits,
            data_date: config.data_date_override().map(str::to_string),
            cache: CacheStore::new(
                &config.cache_db_path(),
                config.cache_busy_timeout(),
                config.cache_max_json_bytes(),
            ),
            gate: ConcurrencyGate::new(limits.max_concurrent_queries),
            health: SignatureMemo::with_ttl(config.health_cache_ttl()),
            stats: SignatureMemo::until_changed(),
            telemetry: Arc::new(LogTelemetry),
        }
    }

    /// Replace the telemetry sink.
    #[must_use]
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    #[must_use]
    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    #[must_use]
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    #[must_use]
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Compute the co-authorship matrix for `request`.
    ///
    /// # Errors
    ///
    /// See [`QueryError`]. Cache failures are never returned; they are
    /// logged and the result is computed from the dataset.
    pub fn compute_pair_matrix(
        &self,
        request: &PairQueryRequest,
    ) -> Result<PairMatrixResult, QueryError> {
        let started = Instant::now();
        match self.execute(request) {
            Ok(result) => {
                let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                log::info!(
                    "Pair query: {} pairs, {} co-authored, {} ms",
                    result.pair_count,
                    result.coauthored_pair_count(),
                    elapsed_ms
                );
                let payload = json!({
                    "left": result.left_authors,
                    "right": result.right_authors,
                    "exact_base_match": result.exact_base_match,
                    "limit_per_pair": result.limit_per_pair,
                    "author_limit": self.effective_author_limit(request.author_limit),
                    "pair_count": result.pair_count,
                    "coauthored_pair_count": result.coauthored_pair_count(),
                    "elapsed_ms": elapsed_ms,
                });
                emit(self.telemetry.as_ref(), "query", &payload);
                Ok(result)
            }
            Err(err) => {
                log::warn!("Query rejected ({}): {}", err.reason(), err);
                emit(self.telemetry.as_ref(), "query_rejected", &rejection_payload(&err));
                Err(err)
            }
        }
    }

    fn effective_author_limit(&self, requested: Option<u32>) -> Option<u32> {
        requested.map(|limit| limit.clamp(1, self.limits.max_author_resolve))
    }

    fn execute(&self, request: &PairQueryRequest) -> Result<PairMatrixResult, QueryError> {
        request.validate()?;
        let _permit = self
            .gate
            .acquire(self.limits.acquire_timeout)
            .ok_or(QueryError::TooManyConcurrentQueries)?;

        let sig = DbSignature::read(&self.db_path)?;

        let left = sanitize_entries(&request.left);
        let right = sanitize_entries(&request.right);
        if left.is_empty() || right.is_empty() {
            return Err(QueryError::MissingAuthors);
        }
        let max_per_side = self.limits.max_entries_per_side;
        if left.len() > max_per_side || right.len() > max_per_side {
            return Err(QueryError::TooManyAuthors {
                left: left.len(),
                right: right.len(),
                max_per_side,
            });
        }

        let limit_per_pair = request
            .limit_per_pair
            .map(|limit| limit.clamp(1, self.limits.max_limit));
        let author_limit = self.effective_author_limit(request.author_limit);
        let exact = request.exact_base_match;

        let dataset = Dataset::open(&sig.path, self.db_busy_timeout)?;
        dataset.ensure_schema()?;
        let resolver = dataset.resolver();

        let mut resolved: HashMap<&str, Vec<i64>> = HashMap::new();
        for name in left.iter().chain(&right) {
            if !resolved.contains_key(name.as_str()) {
                let ids = self.resolve_cached(&resolver, &sig, name, author_limit, exact)?;
                resolved.insert(name.as_str(), ids);
            }
        }

        let lookup = PairLookup {
            dataset: &dataset,
            sig: &sig,
            limit_per_pair,
            year_min: request.year_min,
        };
        let mut local = HashMap::new();
        let mut matrix = PairMatrix::default();
        let mut pair_pubs = Vec::with_capacity(left.len() * right.len());

        for l in &left {
            let left_ids = resolved.get(l.as_str()).map_or(&[][..], Vec::as_slice);
            let mut row = Vec::with_capacity(right.len());
            for r in &right {
                let right_ids = resolved.get(r.as_str()).map_or(&[][..], Vec::as_slice);
                let items = self.pair_items(&lookup, left_ids, right_ids, &mut local)?;
                row.push((r.clone(), items.len()));
                pair_pubs.push(PairPublications {
                    left: l.clone(),
                    right: r.clone(),
                    count: items.len(),
                    items,
                });
            }
            matrix.push_row(l.clone(), row);
        }

        let pair_count = pair_pubs.len();
        Ok(PairMatrixResult {
            mode: MODE,
            limit_per_pair,
            exact_base_match: exact,
            left_authors: left,
            right_authors: right,
            matrix,
            pair_pubs,
            pair_count,
        })
    }

    fn resolve_cached(
        &self,
        resolver: &AuthorResolver<'_>,
        sig: &DbSignature,
        name: &str,
        limit: Option<u32>,
        exact: bool,
    ) -> Result<Vec<i64>, QueryError> {
        match self.cache.get_author_ids(sig, name, exact, limit) {
            Ok(Some(ids)) => {
                log::trace!("Author cache hit: {:?}", name);
                return Ok(ids);
            }
            Ok(None) => log::trace!("Author cache miss: {:?}", name),
            Err(e) => log::warn!("Author cache read failed for {:?}: {}", name, e),
        }

        let ids = resolver.resolve(name, limit, exact)?;
        if let Err(e) = self.cache.put_author_ids(sig, name, exact, limit, &ids) {
            log::warn!("Failed to persist author cache for {:?}: {}", name, e);
        }
        Ok(ids)
    }

    fn pair_items(
        &self,
        lookup: &PairLookup<'_>,
        left_ids: &[i64],
        right_ids: &[i64],
        local: &mut HashMap<String, Vec<Publication>>,
    ) -> Result<Vec<Publication>, QueryError> {
        if left_ids.is_empty() || right_ids.is_empty() {
            return Ok(Vec::new());
        }

        let key = pair_key(
            lookup.sig,
            left_ids,
            right_ids,
            lookup.limit_per_pair,
            lookup.year_min,
        );
        if let Some(items) = local.get(&key) {
            return Ok(items.clone());
        }

        match self.cache.get_pair_items(
            lookup.sig,
            left_ids,
            right_ids,
            lookup.limit_per_pair,
            lookup.year_min,
        ) {
            Ok(Some(items)) => {
                log::trace!("Pair cache hit: {}", key);
                local.insert(key, items.clone());
                return Ok(items);
            }
            Ok(None) => log::trace!("Pair cache miss: {}", key),
            Err(e) => log::warn!("Pair cache read failed: {}", e),
        }

        let items = lookup.dataset.pair_publications(
            left_ids,
            right_ids,
            lookup.year_min,
            lookup.limit_per_pair,
        )?;
        if let Err(e) = self.cache.put_pair_items(
            lookup.sig,
            left_ids,
            right_ids,
            lookup.limit_per_pair,
            lookup.year_min,
            &items,
        ) {
            log::warn!("Failed to persist pair cache: {}", e);
        }
        local.insert(key, items.clone());
        Ok(items)
    }

    /// Probe dataset health, memoized per signature for the configured TTL.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        let sig = match DbSignature::read(&self.db_path) {
            Ok(sig) => sig,
            Err(e) => return HealthReport::from_outcome(&HealthOutcome::from_error(&e), false),
        };

        let (outcome, hit) = self.health.get_or_insert_with(&sig, || {
            match Dataset::open(&sig.path, self.db_busy_timeout).and_then(|ds| ds.ensure_schema()) {
                Ok(()) => HealthOutcome::ok(),
                Err(e) => {
                    log::warn!("Health check failed: {}", e);
                    HealthOutcome::from_error(&e)
                }
            }
        });
        HealthReport::from_outcome(&outcome, hit)
    }

    /// Dataset statistics, memoized until the signature changes.
    ///
    /// The boolean is `true` when the value came from the memo.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] if the dataset cannot be read. Errors are not
    /// memoized.
    pub fn stats(&self) -> Result<(DatasetStats, bool), QueryError> {
        let sig = DbSignature::read(&self.db_path)?;
        self.stats.get_or_try_insert_with(&sig, || {
            let dataset = Dataset::open(&sig.path, self.db_busy_timeout)?;
            let counts = dataset.counts()?;
            Ok(DatasetStats {
                publications: counts.publications,
                authors: counts.authors,
                data_source: DATA_SOURCE.to_string(),
                data_date: self
                    .data_date
                    .clone()
                    .unwrap_or_else(|| sig.data_date()),
            })
        })
    }
}

struct PairLookup<'a> {
    dataset: &'a Dataset,
    sig: &'a DbSignature,
    limit_per_pair: Option<u32>,
    year_min: Option<i32>,
}

fn rejection_payload(err: &QueryError) -> Value {
    match err {
        QueryError::TooManyAuthors {
            left,
            right,
            max_per_side,
        } => json!({
            "reason": err.reason(),
            "left_n": left,
            "right_n": right,
            "max_per_side": max_per_side,
        }),
        _ => json!({ "reason": err.reason() }),
    }
}
