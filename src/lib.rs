//! coauthors - Co-authorship lookups over DBLP
//!
//! Resolves two lists of author names against a DBLP SQLite dataset and
//! reports the publications every (left, right) pair shares, with a
//! persistent result cache keyed by dataset signature.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod gate;
pub mod health;
pub mod logging;
pub mod names;
pub mod output;
pub mod pipeline;
pub mod query;
pub mod resolver;
pub mod signature;
pub mod telemetry;

pub use app::run_app;
