use super::fixtures::TestEnv;
use coauthors::config::Config;
use coauthors::query::QueryEngine;
use filetime::{set_file_mtime, FileTime};
use rusqlite::Connection;

#[test]
fn test_healthy_dataset() {
    let env = TestEnv::new();
    let engine = env.engine();

    let report = engine.health();
    assert!(report.healthy);
    assert_eq!(report.status, "ok");
    assert_eq!(report.http_status, 200);
    assert_eq!(report.detail, None);
    assert!(!report.cache_hit);

    let again = engine.health();
    assert!(again.healthy);
    assert!(again.cache_hit);
}

#[test]
fn test_missing_dataset_is_unhealthy_and_not_memoized() {
    let env = TestEnv::empty();
    let engine = env.engine();

    let report = engine.health();
    assert!(!report.healthy);
    assert_eq!(report.status, "error");
    assert_eq!(report.http_status, 503);
    assert!(!report.cache_hit);

    super::fixtures::build_dblp(&env.db_path, false);
    let report = engine.health();
    assert!(report.healthy, "fresh dataset is probed immediately");
}

#[test]
fn test_schema_failure_is_memoized_within_ttl() {
    let env = TestEnv::empty();
    let conn = Connection::open(&env.db_path).unwrap();
    conn.execute_batch("CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT);")
        .unwrap();
    drop(conn);

    let engine = QueryEngine::new(&Config {
        health_cache_ttl_ms: 60_000,
        ..env.config()
    });
    let first = engine.health();
    assert!(!first.healthy);
    assert_eq!(first.http_status, 503);
    assert_eq!(first.detail.as_deref(), Some("Database schema is incomplete."));

    let second = engine.health();
    assert!(second.cache_hit);
    assert_eq!(second.detail, first.detail);
}

#[test]
fn test_health_memo_follows_signature() {
    let env = TestEnv::new();
    let engine = QueryEngine::new(&Config {
        health_cache_ttl_ms: 60_000,
        ..env.config()
    });
    assert!(!engine.health().cache_hit);
    assert!(engine.health().cache_hit);

    set_file_mtime(&env.db_path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
    assert!(!engine.health().cache_hit);
}

#[test]
fn test_stats_counts_and_memo() {
    let env = TestEnv::new();
    let engine = env.engine();

    let (stats, hit) = engine.stats().unwrap();
    assert!(!hit);
    assert_eq!(stats.publications, 6);
    assert_eq!(stats.authors, 6);
    assert_eq!(stats.data_source, "DBLP");
    assert_eq!(stats.data_date.len(), 10);

    let (again, hit) = engine.stats().unwrap();
    assert!(hit);
    assert_eq!(again, stats);
}

#[test]
fn test_stats_data_date_from_mtime_or_override() {
    let env = TestEnv::new();
    set_file_mtime(&env.db_path, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

    let (stats, _) = env.engine().stats().unwrap();
    assert_eq!(stats.data_date, "2023-11-14");

    let engine = QueryEngine::new(&Config {
        data_date: Some("2024-06-01".to_string()),
        ..env.config()
    });
    let (stats, _) = engine.stats().unwrap();
    assert_eq!(stats.data_date, "2024-06-01");
}

#[test]
fn test_stats_without_dataset() {
    let env = TestEnv::empty();
    let err = env.engine().stats().unwrap_err();
    assert_eq!(err.status().http_code(), 503);
}
