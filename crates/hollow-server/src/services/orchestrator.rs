//! Task orchestrator
//!
//! Starts pull/push/publish as independent tokio tasks keyed by a random key,
//! reports their lifecycle into the [`TaskHub`], and cancels them on request.

use super::task_hub::{TaskHub, TaskOutput};
use crate::config::random_string;
use async_trait::async_trait;
use futures::FutureExt;
use hollow_types::{Repo, Task, TaskInfo, TaskKind, TaskOutcome};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

/// Length of generated task keys
pub const KEY_LEN: usize = 8;

/// Everything a backend needs to run one task
#[derive(Debug, Clone)]
pub struct Job {
    pub kind: TaskKind,
    pub project_id: i64,
    pub repo: Option<Repo>,
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("{step} could not start: {source}")]
    Spawn {
        step: String,
        source: std::io::Error,
    },

    #[error("{step} exited with {status}")]
    Exit { step: String, status: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Runs the actual work of a task, writing its output as it goes.
///
/// The returned future is dropped when the task is cancelled, so anything it
/// spawns must die with it.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn run(&self, job: &Job, out: &TaskOutput) -> Result<(), TaskError>;
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("task {0} is already running for this project")]
    Busy(String),

    #[error("unknown task {0}")]
    NotFound(String),

    #[error("task {0} has already finished")]
    Finished(String),
}

pub struct Orchestrator {
    hub: Arc<TaskHub>,
    backend: Arc<dyn TaskBackend>,
    serialize_per_project: bool,
    /// Makes the busy check and registration one step
    start_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(hub: Arc<TaskHub>, backend: Arc<dyn TaskBackend>, serialize_per_project: bool) -> Self {
        Self {
            hub,
            backend,
            serialize_per_project,
            start_lock: Mutex::new(()),
        }
    }

    pub fn hub(&self) -> &Arc<TaskHub> {
        &self.hub
    }

    /// Register and spawn a task. Returns as soon as it is running.
    pub fn start(&self, kind: TaskKind, project_id: i64, repo: Option<Repo>) -> Result<Task, OrchestratorError> {
        let (key, cancel) = {
            let _guard = self
                .start_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if self.serialize_per_project {
                if let Some(running) = self.hub.running_for_project(project_id) {
                    return Err(OrchestratorError::Busy(running));
                }
            }
            loop {
                let key = random_string(KEY_LEN);
                if let Some(cancel) = self.hub.register(&key, kind, project_id) {
                    break (key, cancel);
                }
            }
        };
        info!("Task started key={} kind={} project={}", key, kind, project_id);

        let job = Job {
            kind,
            project_id,
            repo,
        };
        let out = TaskOutput::new(self.hub.clone(), key.clone());
        let hub = self.hub.clone();
        let backend = self.backend.clone();
        let task_key = key.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            out.line(format!("[Hollow] start {}", kind));
            let run = AssertUnwindSafe(backend.run(&job, &out)).catch_unwind();
            let outcome = tokio::select! {
                result = run => match result {
                    Ok(Ok(())) => {
                        out.line(format!(
                            "[Hollow] {} success in {:.1}s",
                            kind,
                            started.elapsed().as_secs_f64()
                        ));
                        TaskOutcome::Succeeded
                    }
                    Ok(Err(e)) => {
                        out.line(format!("[Hollow] {} fail: {}", kind, e));
                        warn!("Task {} {} failed: {}", kind, task_key, e);
                        TaskOutcome::Failed { error: e.to_string() }
                    }
                    Err(panic) => {
                        let error = format!("panicked: {}", panic_message(panic.as_ref()));
                        out.line(format!("[Hollow] {} fail: {}", kind, error));
                        error!("Task {} {} {}", kind, task_key, error);
                        TaskOutcome::Failed { error }
                    }
                },
                _ = cancel.cancelled() => {
                    out.line(format!("[Hollow] {} cancelled", kind));
                    TaskOutcome::Cancelled
                }
            };
            hub.finish(&task_key, outcome);
        });

        Ok(Task { key, kind })
    }

    pub fn cancel(&self, key: &str) -> Result<(), OrchestratorError> {
        match self.hub.cancel_token(key) {
            None => Err(OrchestratorError::NotFound(key.to_string())),
            Some((_, false)) => Err(OrchestratorError::Finished(key.to_string())),
            Some((token, true)) => {
                info!("Cancelling task {}", key);
                token.cancel();
                Ok(())
            }
        }
    }

    pub fn status(&self, key: &str) -> Option<TaskInfo> {
        self.hub.info(key)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
