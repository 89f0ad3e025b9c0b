//! JSON output formatter.
//!
//! Wraps any serializable response (pair query results, health reports,
//! dataset and cache statistics) for compact or pretty output.
//!
//! # Output Schema (pair query)
//!
//! ```json
//! {
//!   "mode": "fullmeta",
//!   "limit_per_pair": 20,
//!   "exact_base_match": true,
//!   "left_authors": ["Jane Doe"],
//!   "right_authors": ["Bob Roe"],
//!   "matrix": {"Jane Doe": {"Bob Roe": 1}},
//!   "pair_pubs": [
//!     {
//!       "left": "Jane Doe",
//!       "right": "Bob Roe",
//!       "count": 1,
//!       "items": [{"title": "...", "year": 2020, "venue": "VLDB", "pub_type": "article"}]
//!     }
//!   ],
//!   "pair_count": 1
//! }
//! ```

use std::io::Write;

use serde::Serialize;

/// JSON rendering of a borrowed value.
#[derive(Debug, Clone, Copy)]
pub struct JsonOutput<'a, T: Serialize> {
    value: &'a T,
}

impl<'a, T: Serialize> JsonOutput<'a, T> {
    /// Wrap `value` for output.
    ///
    /// # Example
    ///
    /// ```
    /// use coauthors::output::json::JsonOutput;
    /// use serde_json::json;
    ///
    /// let value = json!({"status": "ok"});
    /// let output = JsonOutput::new(&value);
    /// assert_eq!(output.to_json().unwrap(), r#"{"status":"ok"}"#);
    /// ```
    #[must_use]
    pub fn new(value: &'a T) -> Self {
        Self { value }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self.value)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self.value)
    }

    /// Write JSON to a writer, followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
