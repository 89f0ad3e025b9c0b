//! Output formatters for command results.
//!
//! - JSON for any serializable response
//! - CSV for pair query results, one row per shared publication
//!
//! # Example
//!
//! ```no_run
//! use coauthors::config::Config;
//! use coauthors::output::{CsvOutput, JsonOutput};
//! use coauthors::query::{PairQueryRequest, QueryEngine};
//!
//! let engine = QueryEngine::new(&Config::default());
//! let request = PairQueryRequest::new(vec!["Jane Doe".into()], vec!["Bob Roe".into()]);
//! let result = engine.compute_pair_matrix(&request).unwrap();
//!
//! println!("{}", JsonOutput::new(&result).to_json_pretty().unwrap());
//! print!("{}", CsvOutput::new(&result).to_string().unwrap());
//! ```

pub mod csv;
pub mod json;

pub use csv::CsvOutput;
pub use json::JsonOutput;
