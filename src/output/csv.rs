//! CSV output formatter for pair query results.
//!
//! One row is generated for each publication of each pair. Pairs without
//! shared publications still get one row, with empty publication fields, so
//! the full matrix is recoverable from the file.
//!
//! # Columns
//!
//! - `left`, `right`: Sanitized author names
//! - `count`: Number of shared publications for the pair
//! - `title`, `year`, `venue`, `pub_type`: Publication fields

use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::query::PairMatrixResult;

/// Errors that can occur during CSV output generation.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    left: &'a str,
    right: &'a str,
    count: usize,
    title: Option<&'a str>,
    year: Option<i64>,
    venue: Option<&'a str>,
    pub_type: Option<&'a str>,
}

/// CSV output formatter.
pub struct CsvOutput<'a> {
    result: &'a PairMatrixResult,
}

impl<'a> CsvOutput<'a> {
    /// Create a new CSV output formatter.
    #[must_use]
    pub fn new(result: &'a PairMatrixResult) -> Self {
        Self { result }
    }

    /// Write the CSV output to the given writer.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvOutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        for pair in &self.result.pair_pubs {
            if pair.items.is_empty() {
                csv_writer.serialize(CsvRow {
                    left: &pair.left,
                    right: &pair.right,
                    count: 0,
                    title: None,
                    year: None,
                    venue: None,
                    pub_type: None,
                })?;
                continue;
            }

            for item in &pair.items {
                csv_writer.serialize(CsvRow {
                    left: &pair.left,
                    right: &pair.right,
                    count: pair.count,
                    title: Some(&item.title),
                    year: item.year,
                    venue: item.venue.as_deref(),
                    pub_type: item.pub_type.as_deref(),
                })?;
            }
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Generate CSV output as a string.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if serialization fails.
    pub fn to_string(&self) -> Result<String, CsvOutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
