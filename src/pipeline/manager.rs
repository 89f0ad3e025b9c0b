//! Background runner for the ingestion pipeline.
//!
//! At most one job runs at a time, on a dedicated worker thread. Callers
//! observe it through [`PipelineManager::snapshot`], which copies the state
//! under the lock.
//!
//! A panic inside [`Pipeline::run`] is caught and recorded as an `error`
//! status with the message "pipeline panicked". This needs unwinding panics:
//! the release profile in `Cargo.toml` sets `panic = "abort"`, so in release
//! builds a panicking pipeline aborts the whole process instead.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::{Local, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::{Pipeline, PipelineConfig, PipelineError, PipelineHooks, PipelineMode, PipelineOutcome};
use super::token::StopToken;

/// Maximum retained log lines. Older lines are dropped first.
pub const MAX_LOG_LINES: usize = 1000;

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "dblp-bootstrap-worker";

/// Lifecycle state of the managed job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Stopped,
    Error,
}

/// Errors from manager commands.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("A pipeline is already running.")]
    AlreadyRunning,

    #[error("Cannot reset while running.")]
    ResetWhileRunning,

    #[error(transparent)]
    InvalidConfig(#[from] PipelineError),

    #[error("Failed to spawn pipeline worker: {0}")]
    Spawn(std::io::Error),
}

#[derive(Debug, Clone)]
struct JobState {
    status: JobStatus,
    step: String,
    mode: PipelineMode,
    message: String,
    started_at: Option<String>,
    finished_at: Option<String>,
    progress: Map<String, Value>,
    result: Option<Value>,
    logs: Vec<String>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            status: JobStatus::Idle,
            step: "idle".to_string(),
            mode: PipelineMode::default(),
            message: String::new(),
            started_at: None,
            finished_at: None,
            progress: Map::new(),
            result: None,
            logs: Vec::new(),
        }
    }
}

impl JobState {
    fn append_log(&mut self, message: &str) {
        log::debug!(target: "coauthors::pipeline", "{}", message);
        self.logs
            .push(format!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message));
        if self.logs.len() > MAX_LOG_LINES {
            let excess = self.logs.len() - MAX_LOG_LINES;
            self.logs.drain(..excess);
        }
    }

    fn finish(&mut self, outcome: PipelineOutcome) {
        self.finished_at = Some(now_iso());
        match outcome {
            PipelineOutcome::Completed(summary) => {
                self.status = JobStatus::Completed;
                self.step = "done".to_string();
                self.message = "Pipeline completed.".to_string();
                self.result = Some(summary);
                self.append_log("Pipeline completed successfully.");
            }
            PipelineOutcome::Stopped(reason) => {
                self.status = JobStatus::Stopped;
                self.step = "stopped".to_string();
                self.append_log(&reason);
                self.message = reason;
            }
            PipelineOutcome::Failed(reason) => {
                self.status = JobStatus::Error;
                self.step = "error".to_string();
                self.append_log(&format!("Pipeline error: {reason}"));
                self.message = reason;
            }
        }
    }
}

/// Point-in-time copy of the job state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub step: String,
    pub mode: PipelineMode,
    pub message: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub progress: Map<String, Value>,
    pub result: Option<Value>,
    pub logs: Vec<String>,
    /// Whether the worker thread is still alive.
    pub running: bool,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn lock(state: &Mutex<JobState>) -> MutexGuard<'_, JobState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct WorkerHooks {
    state: Arc<Mutex<JobState>>,
    token: StopToken,
}

impl PipelineHooks for WorkerHooks {
    fn on_log(&self, message: &str) {
        lock(&self.state).append_log(message);
    }

    fn on_progress(&self, step: &str, payload: &Value) {
        let mut state = lock(&self.state);
        state.step = step.to_string();
        if let Some(fields) = payload.as_object() {
            for (key, value) in fields {
                state.progress.insert(key.clone(), value.clone());
            }
        }
        state.message = format!("Running: {step}");
    }

    fn should_stop(&self) -> bool {
        self.token.is_stop_requested()
    }
}

/// Runs a [`Pipeline`] in the background, one job at a time.
pub struct PipelineManager {
    pipeline: Arc<dyn Pipeline>,
    state: Arc<Mutex<JobState>>,
    worker: Mutex<Worker>,
}

#[derive(Default)]
struct Worker {
    handle: Option<JoinHandle<()>>,
    token: StopToken,
}

impl Worker {
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl PipelineManager {
    #[must_use]
    pub fn new(pipeline: Arc<dyn Pipeline>) -> Self {
        Self {
            pipeline,
            state: Arc::new(Mutex::new(JobState::default())),
            worker: Mutex::new(Worker::default()),
        }
    }

    fn worker(&self) -> MutexGuard<'_, Worker> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a job with `config`.
    ///
    /// Panics in the worker are contained only when the build unwinds on
    /// panic (see the module docs).
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::AlreadyRunning`] while a job is alive, or the
    /// validation error for an invalid configuration.
    pub fn start(&self, config: PipelineConfig) -> Result<(), ManagerError> {
        config.validate()?;
        let mut worker = self.worker();
        if worker.is_running() {
            return Err(ManagerError::AlreadyRunning);
        }

        {
            let mut state = lock(&self.state);
            *state = JobState {
                status: JobStatus::Running,
                step: "prepare".to_string(),
                mode: config.mode,
                message: "Pipeline started.".to_string(),
                started_at: Some(now_iso()),
                ..JobState::default()
            };
            state.append_log("Pipeline accepted.");
            state.append_log(&format!(
                "Mode={}, rebuild={}",
                config.mode.as_str(),
                config.rebuild
            ));
        }

        let token = StopToken::new();
        let hooks = WorkerHooks {
            state: Arc::clone(&self.state),
            token: token.clone(),
        };
        let pipeline = Arc::clone(&self.pipeline);
        let state = Arc::clone(&self.state);
        let mode = config.mode;

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(&config, &hooks)))
                    .unwrap_or_else(|_| Err(PipelineError::Failed("pipeline panicked".to_string())));
                lock(&state).finish(PipelineOutcome::from(result));
            })
            .map_err(|e| {
                let mut state = lock(&self.state);
                state.finish(PipelineOutcome::Failed(e.to_string()));
                ManagerError::Spawn(e)
            })?;

        log::info!("Pipeline started (mode={})", mode.as_str());
        worker.handle = Some(handle);
        worker.token = token;
        Ok(())
    }

    /// Signal the running job to stop. Returns `false` if nothing is running.
    pub fn stop(&self) -> bool {
        let worker = self.worker();
        if !worker.is_running() {
            return false;
        }
        {
            let mut state = lock(&self.state);
            state.append_log("Stop signal sent.");
            state.message = "Stopping...".to_string();
        }
        worker.token.request_stop();
        true
    }

    /// Return to the idle state.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::ResetWhileRunning`] while a job is alive.
    pub fn reset(&self) -> Result<(), ManagerError> {
        let worker = self.worker();
        if worker.is_running() {
            return Err(ManagerError::ResetWhileRunning);
        }
        let mut state = lock(&self.state);
        *state = JobState::default();
        state.append_log("State reset.");
        Ok(())
    }

    /// Copy of the current job state.
    #[must_use]
    pub fn snapshot(&self) -> JobSnapshot {
        let running = self.worker().is_running();
        let state = lock(&self.state).clone();
        JobSnapshot {
            status: state.status,
            step: state.step,
            mode: state.mode,
            message: state.message,
            started_at: state.started_at,
            finished_at: state.finished_at,
            progress: state.progress,
            result: state.result,
            logs: state.logs,
            running,
        }
    }

    /// Block until the current worker, if any, has exited.
    pub fn join(&self) {
        let handle = self.worker().handle.take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::warn!("Pipeline worker exited abnormally");
            }
        }
    }
}
