//! Small DBLP-shaped datasets for integration tests.

use coauthors::config::Config;
use coauthors::query::QueryEngine;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SCHEMA: &str = "
    CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE publications (
        id INTEGER PRIMARY KEY,
        title TEXT,
        year INTEGER,
        venue TEXT,
        pub_type TEXT,
        raw_xml TEXT
    );
    CREATE TABLE pub_authors (pub_id INTEGER NOT NULL, author_id INTEGER NOT NULL);
";

/// Authors:
/// 1 Jane Doe, 2 Jane Doe 0001, 3 Bob Roe, 4 Ann Poe, 5 Janet Doerr, 6 Cal Moe
///
/// Jane Doe (either variant) and Bob Roe share Paper A (2020), Paper B
/// (2020), Paper C (2019) and Paper D (undated). Ann Poe and Janet Doerr
/// share Paper E (2018). Cal Moe has a solo paper.
pub fn build_dblp(path: &Path, with_fts: bool) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn.execute_batch(
        "INSERT INTO authors VALUES
            (1, 'Jane Doe'), (2, 'Jane Doe 0001'), (3, 'Bob Roe'),
            (4, 'Ann Poe'), (5, 'Janet Doerr'), (6, 'Cal Moe');
         INSERT INTO publications (id, title, year, venue, pub_type, raw_xml) VALUES
            (1, 'Paper D', NULL, NULL, 'misc', '<misc/>'),
            (2, 'Paper C', 2019, 'ICDE', 'inproceedings', '<inproceedings/>'),
            (3, 'Paper B', 2020, 'SIGMOD', 'inproceedings', '<inproceedings/>'),
            (4, 'Paper A', 2020, 'VLDB', 'article', '<article/>'),
            (5, 'Paper E', 2018, 'KDD', 'inproceedings', '<inproceedings/>'),
            (6, 'Solo', 2021, 'arXiv', 'article', '<article/>');
         INSERT INTO pub_authors VALUES
            (1, 1), (1, 3),
            (2, 1), (2, 3),
            (3, 2), (3, 3),
            (4, 1), (4, 3), (4, 2),
            (5, 4), (5, 5),
            (6, 6);",
    )
    .unwrap();
    if with_fts {
        conn.execute_batch(
            "CREATE VIRTUAL TABLE author_fts USING fts5(name, content='authors', content_rowid='id');
             INSERT INTO author_fts(author_fts) VALUES ('rebuild');",
        )
        .unwrap();
    }
}

/// Add one publication shared by `author_ids`.
pub fn add_publication(path: &Path, id: i64, title: &str, year: Option<i64>, author_ids: &[i64]) {
    let conn = Connection::open(path).unwrap();
    conn.execute(
        "INSERT INTO publications (id, title, year, venue, pub_type, raw_xml)
         VALUES (?1, ?2, ?3, NULL, 'article', '<article/>')",
        params![id, title, year],
    )
    .unwrap();
    for author_id in author_ids {
        conn.execute(
            "INSERT INTO pub_authors VALUES (?1, ?2)",
            params![id, author_id],
        )
        .unwrap();
    }
}

/// A temporary data directory with a dataset and a cache path.
pub struct TestEnv {
    pub dir: TempDir,
    pub db_path: PathBuf,
    pub cache_path: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_fts(true)
    }

    pub fn with_fts(with_fts: bool) -> Self {
        let env = Self::empty();
        build_dblp(&env.db_path, with_fts);
        env
    }

    /// Paths only; no dataset file is created.
    pub fn empty() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("dblp.sqlite");
        let cache_path = dir.path().join("cache").join("coauthors_cache.sqlite");
        Self {
            dir,
            db_path,
            cache_path,
        }
    }

    pub fn config(&self) -> Config {
        Config {
            data_dir: self.dir.path().to_path_buf(),
            db_path: Some(self.db_path.clone()),
            cache_db_path: Some(self.cache_path.clone()),
            ..Config::default()
        }
    }

    pub fn engine(&self) -> QueryEngine {
        QueryEngine::new(&self.config())
    }
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}
