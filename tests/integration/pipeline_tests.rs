use coauthors::pipeline::{
    JobStatus, ManagerError, Pipeline, PipelineConfig, PipelineError, PipelineHooks,
    PipelineManager,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Loops in batches until asked to stop.
struct Batches {
    started: Arc<AtomicBool>,
}

impl Pipeline for Batches {
    fn run(&self, config: &PipelineConfig, hooks: &dyn PipelineHooks) -> Result<Value, PipelineError> {
        self.started.store(true, Ordering::SeqCst);
        let mut records = 0u64;
        loop {
            if hooks.should_stop() {
                return Err(PipelineError::Interrupted("Stopped by user.".to_string()));
            }
            records += u64::from(config.batch_size);
            hooks.on_progress("parse", &json!({ "records": records }));
            thread::sleep(Duration::from_millis(5));
        }
    }
}

struct Failing;

impl Pipeline for Failing {
    fn run(&self, _config: &PipelineConfig, hooks: &dyn PipelineHooks) -> Result<Value, PipelineError> {
        hooks.on_log("downloading");
        Err(PipelineError::Failed("download failed".to_string()))
    }
}

struct Panicking;

impl Pipeline for Panicking {
    fn run(&self, _config: &PipelineConfig, _hooks: &dyn PipelineHooks) -> Result<Value, PipelineError> {
        panic!("boom");
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_stop_running_pipeline() {
    let started = Arc::new(AtomicBool::new(false));
    let manager = PipelineManager::new(Arc::new(Batches {
        started: Arc::clone(&started),
    }));
    manager.start(PipelineConfig::new("/tmp/coauthors-data")).unwrap();
    wait_until(|| started.load(Ordering::SeqCst));

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.status, JobStatus::Running);
    assert!(snapshot.running);
    assert!(snapshot.started_at.is_some());

    assert!(matches!(
        manager.start(PipelineConfig::new("/tmp/coauthors-data")),
        Err(ManagerError::AlreadyRunning)
    ));
    assert!(matches!(manager.reset(), Err(ManagerError::ResetWhileRunning)));

    assert!(manager.stop());
    manager.join();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.status, JobStatus::Stopped);
    assert_eq!(snapshot.step, "stopped");
    assert_eq!(snapshot.message, "Stopped by user.");
    assert!(!snapshot.running);
    assert!(snapshot.logs.iter().any(|l| l.ends_with("Stop signal sent.")));
}

#[test]
fn test_failed_pipeline_reports_error() {
    let manager = PipelineManager::new(Arc::new(Failing));
    manager.start(PipelineConfig::new("/tmp/coauthors-data")).unwrap();
    manager.join();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.status, JobStatus::Error);
    assert_eq!(snapshot.message, "download failed");
    assert!(snapshot.logs.iter().any(|l| l.ends_with("downloading")));
    assert!(snapshot.result.is_none());

    manager.reset().unwrap();
    assert_eq!(manager.snapshot().status, JobStatus::Idle);
}

#[test]
fn test_panicking_pipeline_is_contained() {
    let manager = PipelineManager::new(Arc::new(Panicking));
    manager.start(PipelineConfig::new("/tmp/coauthors-data")).unwrap();
    manager.join();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.status, JobStatus::Error);
    assert_eq!(snapshot.message, "pipeline panicked");

    // A new job can be started afterwards
    manager.reset().unwrap();
    manager.start(PipelineConfig::new("/tmp/coauthors-data")).unwrap();
    manager.join();
}

#[test]
fn test_snapshot_serializes_lowercase_status() {
    let manager = PipelineManager::new(Arc::new(Failing));
    let value = serde_json::to_value(manager.snapshot()).unwrap();
    assert_eq!(value["status"], "idle");
    assert_eq!(value["mode"], "fullmeta");
    assert_eq!(value["running"], false);
}
