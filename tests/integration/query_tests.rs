use super::fixtures::{add_publication, names, TestEnv};
use coauthors::config::Config;
use coauthors::error::QueryError;
use coauthors::query::{PairQueryRequest, QueryEngine};
use coauthors::telemetry::TelemetrySink;
use filetime::{set_file_mtime, FileTime};
use serde_json::Value;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingSink(Mutex<Vec<(String, Value)>>);

impl TelemetrySink for RecordingSink {
    fn record_event(&self, event_type: &str, payload: &Value) -> anyhow::Result<()> {
        self.0
            .lock()
            .unwrap()
            .push((event_type.to_string(), payload.clone()));
        Ok(())
    }
}

#[test]
fn test_pair_matrix_basic() {
    let env = TestEnv::new();
    let engine = env.engine();
    let request = PairQueryRequest::new(
        names(&["Jane Doe", "Ann Poe"]),
        names(&["Bob Roe", "Cal Moe"]),
    );

    let result = engine.compute_pair_matrix(&request).unwrap();

    assert_eq!(result.mode, "fullmeta");
    assert!(result.exact_base_match);
    assert_eq!(result.left_authors, names(&["Jane Doe", "Ann Poe"]));
    assert_eq!(result.right_authors, names(&["Bob Roe", "Cal Moe"]));
    assert_eq!(result.pair_count, 4);
    assert_eq!(result.matrix.get("Jane Doe", "Bob Roe"), Some(4));
    assert_eq!(result.matrix.get("Jane Doe", "Cal Moe"), Some(0));
    assert_eq!(result.matrix.get("Ann Poe", "Bob Roe"), Some(0));
    assert_eq!(result.coauthored_pair_count(), 1);

    let order: Vec<(&str, &str)> = result
        .pair_pubs
        .iter()
        .map(|p| (p.left.as_str(), p.right.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("Jane Doe", "Bob Roe"),
            ("Jane Doe", "Cal Moe"),
            ("Ann Poe", "Bob Roe"),
            ("Ann Poe", "Cal Moe"),
        ]
    );
}

#[test]
fn test_publications_ordered_newest_first_undated_last() {
    let env = TestEnv::new();
    let engine = env.engine();
    let request = PairQueryRequest::new(names(&["Jane Doe"]), names(&["Bob Roe"]));

    let result = engine.compute_pair_matrix(&request).unwrap();
    let pair = &result.pair_pubs[0];
    let titles: Vec<(&str, Option<i64>)> = pair
        .items
        .iter()
        .map(|p| (p.title.as_str(), p.year))
        .collect();
    assert_eq!(
        titles,
        vec![
            ("Paper A", Some(2020)),
            ("Paper B", Some(2020)),
            ("Paper C", Some(2019)),
            ("Paper D", None),
        ]
    );
    assert_eq!(pair.count, 4);
    assert_eq!(pair.items[0].venue.as_deref(), Some("VLDB"));
    assert_eq!(pair.items[0].pub_type.as_deref(), Some("article"));
}

#[test]
fn test_base_name_matches_numbered_variants() {
    let env = TestEnv::new();
    let engine = env.engine();

    // "Jane Doe 0001" sanitizes to itself but resolves through its base name
    let request = PairQueryRequest::new(names(&["Jane Doe 0001"]), names(&["Bob Roe"]));
    let result = engine.compute_pair_matrix(&request).unwrap();
    assert_eq!(result.left_authors, names(&["Jane Doe 0001"]));
    assert_eq!(result.matrix.get("Jane Doe 0001", "Bob Roe"), Some(4));

    // "Janet Doerr" is not a variant of "Jane Doe"
    let request = PairQueryRequest::new(names(&["Jane Doe"]), names(&["Ann Poe"]));
    let result = engine.compute_pair_matrix(&request).unwrap();
    assert_eq!(result.matrix.get("Jane Doe", "Ann Poe"), Some(0));
}

#[test]
fn test_entries_are_sanitized() {
    let env = TestEnv::new();
    let engine = env.engine();
    let request = PairQueryRequest::new(
        names(&["  jane   doe ", "Jane Doe || Acme Corp", "", "Bob Roe (Univ. X)"]),
        names(&["Bob  Roe", "bob roe :: Elsewhere"]),
    );

    let result = engine.compute_pair_matrix(&request).unwrap();
    assert_eq!(result.left_authors, names(&["jane doe", "Jane Doe", "Bob Roe"]));
    assert_eq!(result.right_authors, names(&["Bob Roe", "bob roe"]));
}

#[test]
fn test_fuzzy_matching_extends_resolution() {
    for with_fts in [true, false] {
        let env = TestEnv::with_fts(with_fts);
        let engine = env.engine();

        let exact = PairQueryRequest::new(names(&["Ann Poe"]), names(&["Doe"]));
        let result = engine.compute_pair_matrix(&exact).unwrap();
        assert_eq!(result.matrix.get("Ann Poe", "Doe"), Some(0));

        let fuzzy = exact.clone().with_exact_base_match(false);
        let result = engine.compute_pair_matrix(&fuzzy).unwrap();
        assert!(!result.exact_base_match);
        assert_eq!(
            result.matrix.get("Ann Poe", "Doe"),
            Some(1),
            "fuzzy match through Janet Doerr (fts: {with_fts})"
        );
        assert_eq!(result.pair_pubs[0].items[0].title, "Paper E");
    }
}

#[test]
fn test_limit_per_pair_and_year_min() {
    let env = TestEnv::new();
    let engine = env.engine();
    let base = PairQueryRequest::new(names(&["Jane Doe"]), names(&["Bob Roe"]));

    let limited = engine
        .compute_pair_matrix(&base.clone().with_limit_per_pair(2))
        .unwrap();
    assert_eq!(limited.limit_per_pair, Some(2));
    assert_eq!(limited.matrix.get("Jane Doe", "Bob Roe"), Some(2));
    assert_eq!(limited.pair_pubs[0].items[1].title, "Paper B");

    let recent = engine
        .compute_pair_matrix(&base.with_year_min(2020))
        .unwrap();
    let titles: Vec<&str> = recent.pair_pubs[0]
        .items
        .iter()
        .map(|p| p.title.as_str())
        .collect();
    assert_eq!(titles, vec!["Paper A", "Paper B"]);
}

#[test]
fn test_limit_per_pair_is_clamped_to_configured_max() {
    let env = TestEnv::new();
    let engine = QueryEngine::new(&Config {
        max_limit: 3,
        ..env.config()
    });
    let request =
        PairQueryRequest::new(names(&["Jane Doe"]), names(&["Bob Roe"])).with_limit_per_pair(4000);

    let result = engine.compute_pair_matrix(&request).unwrap();
    assert_eq!(result.limit_per_pair, Some(3));
    assert_eq!(result.pair_pubs[0].count, 3);
}

#[test]
fn test_repeated_query_hits_cache_without_new_entries() {
    let env = TestEnv::new();
    let engine = env.engine();
    let request = PairQueryRequest::new(names(&["Jane Doe"]), names(&["Bob Roe", "Ann Poe"]));

    let first = engine.compute_pair_matrix(&request).unwrap();
    let after_first = engine.cache().stats().unwrap();
    assert_eq!(after_first.author_resolve.entries, 3);
    // Jane Doe x Ann Poe has no publications but both resolve to IDs
    assert_eq!(after_first.pair_publications.entries, 2);
    assert_eq!(after_first.author_resolve.hits, 0);

    let second = engine.compute_pair_matrix(&request).unwrap();
    assert_eq!(first.pair_pubs, second.pair_pubs);

    let after_second = engine.cache().stats().unwrap();
    assert_eq!(after_second.author_resolve.entries, 3);
    assert_eq!(after_second.pair_publications.entries, 2);
    assert_eq!(after_second.author_resolve.hits, 3);
    assert_eq!(after_second.pair_publications.hits, 2);
}

#[test]
fn test_swapped_sides_share_pair_cache() {
    let env = TestEnv::new();
    let engine = env.engine();

    let forward = PairQueryRequest::new(names(&["Jane Doe"]), names(&["Bob Roe"]));
    let backward = PairQueryRequest::new(names(&["Bob Roe"]), names(&["Jane Doe"]));
    let a = engine.compute_pair_matrix(&forward).unwrap();
    let b = engine.compute_pair_matrix(&backward).unwrap();

    assert_eq!(a.pair_pubs[0].items, b.pair_pubs[0].items);
    let stats = engine.cache().stats().unwrap();
    assert_eq!(stats.pair_publications.entries, 1);
    assert_eq!(stats.pair_publications.hits, 1);
}

#[test]
fn test_dataset_change_invalidates_cached_results() {
    let env = TestEnv::new();
    let engine = env.engine();
    let request = PairQueryRequest::new(names(&["Ann Poe"]), names(&["Cal Moe"]));

    let before = engine.compute_pair_matrix(&request).unwrap();
    assert_eq!(before.matrix.get("Ann Poe", "Cal Moe"), Some(0));

    add_publication(&env.db_path, 100, "Joint Work", Some(2022), &[4, 6]);
    set_file_mtime(&env.db_path, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

    let after = engine.compute_pair_matrix(&request).unwrap();
    assert_eq!(after.matrix.get("Ann Poe", "Cal Moe"), Some(1));
    assert_eq!(after.pair_pubs[0].items[0].title, "Joint Work");
}

#[test]
fn test_oversized_pair_payload_is_not_cached() {
    let env = TestEnv::new();
    let padding = "x".repeat(1_000);
    for id in 0..20 {
        let title = format!("{id:02} {padding}");
        add_publication(&env.db_path, 200 + id, &title, Some(2000), &[4, 6]);
    }
    let engine = QueryEngine::new(&Config {
        cache_max_json_bytes: 10_000,
        ..env.config()
    });
    let request = PairQueryRequest::new(names(&["Ann Poe"]), names(&["Cal Moe"]));

    let result = engine.compute_pair_matrix(&request).unwrap();
    assert_eq!(result.pair_pubs[0].count, 20);

    let stats = engine.cache().stats().unwrap();
    assert_eq!(stats.author_resolve.entries, 2);
    assert_eq!(stats.pair_publications.entries, 0);

    let again = engine.compute_pair_matrix(&request).unwrap();
    assert_eq!(again.pair_pubs, result.pair_pubs);
}

#[test]
fn test_too_many_authors_rejected_before_dataset_access() {
    let env = TestEnv::empty();
    fs::write(&env.db_path, b"this is not a sqlite database").unwrap();
    let engine = env.engine();

    let left: Vec<String> = (0..51).map(|i| format!("Author {i}")).collect();
    let request = PairQueryRequest::new(left, names(&["Bob Roe"]));

    match engine.compute_pair_matrix(&request) {
        Err(QueryError::TooManyAuthors {
            left,
            right,
            max_per_side,
        }) => {
            assert_eq!((left, right, max_per_side), (51, 1, 50));
        }
        other => panic!("expected TooManyAuthors, got {other:?}"),
    }
    assert!(!env.cache_path.exists(), "cache must not be touched");
}

#[test]
fn test_duplicates_count_once_toward_the_cap() {
    let env = TestEnv::new();
    let engine = QueryEngine::new(&Config {
        max_entries_per_side: 2,
        ..env.config()
    });
    let request = PairQueryRequest::new(
        names(&["Jane Doe", "Jane Doe (MIT)", "Jane  Doe", "Ann Poe"]),
        names(&["Bob Roe"]),
    );
    let result = engine.compute_pair_matrix(&request).unwrap();
    assert_eq!(result.left_authors, names(&["Jane Doe", "Ann Poe"]));
}

#[test]
fn test_empty_side_is_rejected() {
    let env = TestEnv::new();
    let engine = env.engine();
    let request = PairQueryRequest::new(names(&["Jane Doe"]), names(&["", "   ", "|| Acme"]));
    assert!(matches!(
        engine.compute_pair_matrix(&request),
        Err(QueryError::MissingAuthors)
    ));
}

#[test]
fn test_out_of_range_options_are_rejected() {
    let env = TestEnv::new();
    let engine = env.engine();
    let base = PairQueryRequest::new(names(&["Jane Doe"]), names(&["Bob Roe"]));

    for request in [
        base.clone().with_limit_per_pair(0),
        base.clone().with_limit_per_pair(5001),
        base.clone().with_author_limit(0),
        base.clone().with_year_min(1899),
        base.clone().with_year_min(2101),
    ] {
        assert!(
            matches!(
                engine.compute_pair_matrix(&request),
                Err(QueryError::InvalidRequest(_))
            ),
            "{request:?}"
        );
    }
}

#[test]
fn test_missing_dataset_is_unavailable() {
    let env = TestEnv::empty();
    let engine = env.engine();
    let request = PairQueryRequest::new(names(&["Jane Doe"]), names(&["Bob Roe"]));
    let err = engine.compute_pair_matrix(&request).unwrap_err();
    assert!(matches!(err, QueryError::Unavailable(_)));
    assert_eq!(err.status().http_code(), 503);
}

#[test]
fn test_incomplete_schema_is_reported() {
    let env = TestEnv::empty();
    let conn = rusqlite::Connection::open(&env.db_path).unwrap();
    conn.execute_batch(
        "CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE publications (id INTEGER PRIMARY KEY, title TEXT, year INTEGER);
         CREATE TABLE pub_authors (pub_id INTEGER, author_id INTEGER);",
    )
    .unwrap();
    drop(conn);

    let engine = env.engine();
    let request = PairQueryRequest::new(names(&["Jane Doe"]), names(&["Bob Roe"]));
    match engine.compute_pair_matrix(&request) {
        Err(QueryError::SchemaIncomplete(msg)) => {
            assert_eq!(
                msg,
                "Current database is not fullmeta-compatible. Missing columns: pub_type, raw_xml, venue"
            );
        }
        other => panic!("expected SchemaIncomplete, got {other:?}"),
    }
}

#[test]
fn test_gate_denies_queries_beyond_capacity() {
    let env = TestEnv::new();
    let engine = QueryEngine::new(&Config {
        max_concurrent_queries: 2,
        ..env.config()
    });
    let request = PairQueryRequest::new(names(&["Jane Doe"]), names(&["Bob Roe"]));

    let first = engine.gate().acquire(Duration::ZERO).unwrap();
    let second = engine.gate().acquire(Duration::ZERO).unwrap();
    let err = engine.compute_pair_matrix(&request).unwrap_err();
    assert!(matches!(err, QueryError::TooManyConcurrentQueries));
    assert_eq!(err.status().http_code(), 429);

    drop(first);
    assert!(engine.compute_pair_matrix(&request).is_ok());
    drop(second);
    assert_eq!(engine.gate().in_flight(), 0);
}

#[test]
fn test_concurrent_queries_share_one_engine() {
    let env = TestEnv::new();
    let engine = QueryEngine::new(&Config {
        max_concurrent_queries: 8,
        query_acquire_timeout_ms: 5_000,
        ..env.config()
    });
    let request = PairQueryRequest::new(names(&["Jane Doe"]), names(&["Bob Roe"]));

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| engine.compute_pair_matrix(&request)))
            .collect();
        for handle in handles {
            let result = handle.join().unwrap().unwrap();
            assert_eq!(result.matrix.get("Jane Doe", "Bob Roe"), Some(4));
        }
    });
}

#[test]
fn test_telemetry_events_for_accepted_and_rejected_queries() {
    let env = TestEnv::new();
    let sink = Arc::new(RecordingSink::default());
    let engine = env.engine().with_telemetry(sink.clone());

    let request = PairQueryRequest::new(names(&["Jane Doe"]), names(&["Bob Roe", "Cal Moe"]))
        .with_author_limit(5_000);
    engine.compute_pair_matrix(&request).unwrap();
    let rejected = PairQueryRequest::new(names(&["Jane Doe"]), Vec::new());
    engine.compute_pair_matrix(&rejected).unwrap_err();

    let events = sink.0.lock().unwrap();
    assert_eq!(events.len(), 2);

    let (kind, payload) = &events[0];
    assert_eq!(kind, "query");
    assert_eq!(payload["left"], serde_json::json!(["Jane Doe"]));
    assert_eq!(payload["right"], serde_json::json!(["Bob Roe", "Cal Moe"]));
    assert_eq!(payload["exact_base_match"], true);
    assert_eq!(payload["author_limit"], 800);
    assert_eq!(payload["pair_count"], 2);
    assert_eq!(payload["coauthored_pair_count"], 1);
    assert!(payload["elapsed_ms"].is_u64());

    let (kind, payload) = &events[1];
    assert_eq!(kind, "query_rejected");
    assert_eq!(payload["reason"], "missing_authors");
}
