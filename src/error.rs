//! Query error taxonomy, response statuses and process exit codes.

use serde::Serialize;
use thiserror::Error;

/// Transport-neutral status class of a failed query.
///
/// The numeric value is the HTTP status a web front end would answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStatus {
    /// The request itself is unacceptable (400).
    BadRequest,
    /// Too many queries are running; retry later (429).
    TooManyRequests,
    /// An unexpected database failure (500).
    Internal,
    /// The dataset is missing or incomplete (503).
    ServiceUnavailable,
}

impl ErrorStatus {
    /// Get the equivalent HTTP status code.
    #[must_use]
    pub fn http_code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::TooManyRequests => 429,
            Self::Internal => 500,
            Self::ServiceUnavailable => 503,
        }
    }
}

/// Errors surfaced by the query engine to its callers.
///
/// Cache-layer failures never appear here: they are logged and degrade to
/// recomputing from the dataset.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The database file is missing or cannot be read.
    #[error("{0}")]
    Unavailable(String),

    /// Required tables or columns are absent from the dataset.
    #[error("{0}")]
    SchemaIncomplete(String),

    /// One side of the query is empty after sanitization.
    #[error("Both left and right author lists are required.")]
    MissingAuthors,

    /// One side of the query exceeds the per-side cap.
    #[error("Too many authors. Max {max_per_side} per side is allowed for a single query.")]
    TooManyAuthors {
        /// Sanitized left entry count
        left: usize,
        /// Sanitized right entry count
        right: usize,
        /// Configured per-side cap
        max_per_side: usize,
    },

    /// A request field is outside its accepted range.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The concurrency gate denied admission.
    #[error("Too many concurrent queries. Please retry in a moment.")]
    TooManyConcurrentQueries,

    /// A dataset query failed after the connection was established.
    #[error("Database query failed: {0}")]
    Database(#[from] rusqlite::Error),
}

impl QueryError {
    /// Status class of this error.
    #[must_use]
    pub fn status(&self) -> ErrorStatus {
        match self {
            Self::Unavailable(_) | Self::SchemaIncomplete(_) => ErrorStatus::ServiceUnavailable,
            Self::MissingAuthors | Self::TooManyAuthors { .. } | Self::InvalidRequest(_) => {
                ErrorStatus::BadRequest
            }
            Self::TooManyConcurrentQueries => ErrorStatus::TooManyRequests,
            Self::Database(_) => ErrorStatus::Internal,
        }
    }

    /// Short machine-readable reason, used for rejected-query telemetry.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::SchemaIncomplete(_) => "schema_incomplete",
            Self::MissingAuthors => "missing_authors",
            Self::TooManyAuthors { .. } => "too_many_authors",
            Self::InvalidRequest(_) => "invalid_request",
            Self::TooManyConcurrentQueries => "too_many_concurrent_queries",
            Self::Database(_) => "database_error",
        }
    }
}

/// Exit codes for the coauthors binary.
///
/// - 0: Success
/// - 1: General error (unexpected failure)
/// - 2: Bad request (empty side, too many authors, out-of-range option)
/// - 3: Dataset unavailable or incomplete
/// - 4: Too many concurrent queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the command completed normally.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// Bad request: the query was rejected during validation.
    BadRequest = 2,
    /// Unavailable: the dataset is missing or has an incomplete schema.
    Unavailable = 3,
    /// Busy: the concurrency gate denied the query.
    Busy = 4,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "CA000",
            Self::GeneralError => "CA001",
            Self::BadRequest => "CA002",
            Self::Unavailable => "CA003",
            Self::Busy => "CA004",
        }
    }

    /// Pick the exit code for an error returned by `run_app`.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<QueryError>().map(QueryError::status) {
            Some(ErrorStatus::BadRequest) => Self::BadRequest,
            Some(ErrorStatus::ServiceUnavailable) => Self::Unavailable,
            Some(ErrorStatus::TooManyRequests) => Self::Busy,
            Some(ErrorStatus::Internal) | None => Self::GeneralError,
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "CA002")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Equivalent HTTP status, when the error came from the query engine
    pub http_status: Option<u16>,
    /// Human-readable error message
    pub message: String,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            http_status: err
                .downcast_ref::<QueryError>()
                .map(|e| e.status().http_code()),
            message: err.to_string(),
        }
    }
}
