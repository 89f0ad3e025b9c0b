//! Dataset ingestion pipeline interface.
//!
//! The pipeline that downloads the DBLP dump and builds the SQLite dataset
//! lives outside this crate. This module fixes the contract it is driven
//! through:
//!
//! * [`PipelineConfig`]: validated job parameters
//! * [`Pipeline`] and [`PipelineHooks`]: the run call and its callbacks
//! * [`PipelineOutcome`]: how a run ended
//! * [`manager::PipelineManager`]: runs one job at a time in the background

pub mod manager;
pub mod token;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use manager::{JobSnapshot, JobStatus, ManagerError, PipelineManager};
pub use token::StopToken;

/// Default location of the compressed DBLP XML dump.
pub const DEFAULT_SOURCE_URL: &str = "https://dblp.org/xml/dblp.xml.gz";

/// Default location of the DBLP DTD.
pub const DEFAULT_AUX_RESOURCE_URL: &str = "https://dblp.org/xml/dblp.dtd";

/// Default number of records per insert batch.
pub const DEFAULT_BATCH_SIZE: u32 = 1000;

/// Default number of records between progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: u32 = 10_000;

const BATCH_SIZE_RANGE: std::ops::RangeInclusive<u32> = 100..=20_000;
const PROGRESS_INTERVAL_RANGE: std::ops::RangeInclusive<u32> = 1000..=500_000;
const MIN_URL_LEN: usize = 10;

/// Dataset layout produced by the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Publications with title, year, venue, type and raw XML.
    #[default]
    Fullmeta,
}

impl PipelineMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fullmeta => "fullmeta",
        }
    }
}

/// Parameters of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub source_url: String,
    pub aux_resource_url: String,
    pub data_dir: PathBuf,
    pub mode: PipelineMode,
    pub batch_size: u32,
    pub progress_interval: u32,
    /// Replace an existing dataset instead of resuming into it.
    pub rebuild: bool,
}

impl PipelineConfig {
    /// Configuration with default sources writing into `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            aux_resource_url: DEFAULT_AUX_RESOURCE_URL.to_string(),
            data_dir: data_dir.into(),
            mode: PipelineMode::Fullmeta,
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            rebuild: true,
        }
    }

    #[must_use]
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = url.into();
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_progress_interval(mut self, interval: u32) -> Self {
        self.progress_interval = interval;
        self
    }

    #[must_use]
    pub fn with_rebuild(mut self, rebuild: bool) -> Self {
        self.rebuild = rebuild;
        self
    }

    /// Check URL lengths and numeric ranges.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.source_url.len() < MIN_URL_LEN {
            return Err(PipelineError::InvalidConfig(format!(
                "source_url must be at least {MIN_URL_LEN} characters"
            )));
        }
        if self.aux_resource_url.len() < MIN_URL_LEN {
            return Err(PipelineError::InvalidConfig(format!(
                "aux_resource_url must be at least {MIN_URL_LEN} characters"
            )));
        }
        if !BATCH_SIZE_RANGE.contains(&self.batch_size) {
            return Err(PipelineError::InvalidConfig(format!(
                "batch_size must be between {} and {}",
                BATCH_SIZE_RANGE.start(),
                BATCH_SIZE_RANGE.end()
            )));
        }
        if !PROGRESS_INTERVAL_RANGE.contains(&self.progress_interval) {
            return Err(PipelineError::InvalidConfig(format!(
                "progress_interval must be between {} and {}",
                PROGRESS_INTERVAL_RANGE.start(),
                PROGRESS_INTERVAL_RANGE.end()
            )));
        }
        Ok(())
    }
}

/// Callbacks a running pipeline reports through.
pub trait PipelineHooks: Send + Sync {
    /// A human-readable log line.
    fn on_log(&self, message: &str);

    /// Progress for `step`. Object payload keys are merged into the job's
    /// progress map.
    fn on_progress(&self, step: &str, payload: &Value);

    /// Polled between batches. A `true` answer should end the run with
    /// [`PipelineError::Interrupted`].
    fn should_stop(&self) -> bool;
}

/// An ingestion pipeline.
pub trait Pipeline: Send + Sync {
    /// Run to completion, returning a JSON summary.
    fn run(&self, config: &PipelineConfig, hooks: &dyn PipelineHooks) -> Result<Value, PipelineError>;
}

/// Errors a pipeline run can end with.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run stopped because a stop was requested.
    #[error("{0}")]
    Interrupted(String),

    /// The configuration was rejected before the run started.
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// I/O failure while downloading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite failure while building the dataset.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Completed(Value),
    Stopped(String),
    Failed(String),
}

impl From<Result<Value, PipelineError>> for PipelineOutcome {
    fn from(result: Result<Value, PipelineError>) -> Self {
        match result {
            Ok(summary) => Self::Completed(summary),
            Err(PipelineError::Interrupted(reason)) => Self::Stopped(reason),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}
