//! Priority scheduler with a fixed concurrency cap.
//!
//! Submissions are queued by priority; the dispatch loop ([`TaskEngine::run`])
//! pops the most urgent entry, waits for a free slot and hands the job to
//! its own task without waiting for it to finish. Each dispatched job holds
//! its slot until its run returns, fails or panics.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::job_queue::JobQueue;
use super::jobs::MediaJob;
use super::priority::PriorityWindow;
use crate::status::{StatusEvent, StatusReporter};
use crate::{Error, Result};

fn default_max_concurrent_tasks() -> usize {
    3
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

/// Scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of jobs running at once.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Accepted priority range and default priority.
    #[serde(default)]
    pub priority: PriorityWindow,
    /// How long shutdown waits for running jobs, in seconds.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            priority: PriorityWindow::default(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl EngineConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// The task engine.
pub struct TaskEngine {
    config: EngineConfig,
    queue: JobQueue<MediaJob>,
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
    reporter: StatusReporter,
}

impl TaskEngine {
    pub fn new(config: EngineConfig, reporter: StatusReporter) -> Self {
        let slots = config.max_concurrent_tasks.max(1);
        Self {
            config,
            queue: JobQueue::new(),
            slots: Arc::new(Semaphore::new(slots)),
            tracker: TaskTracker::new(),
            reporter,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Queue a job and return the priority it was queued at.
    ///
    /// `None` selects the default priority; values outside the configured
    /// window are replaced by the default with a warning. Fails only once
    /// [`stop`](Self::stop) has been requested.
    pub fn submit(&self, job: MediaJob, priority: Option<i32>) -> Result<i32> {
        let window = self.config.priority;
        let requested = priority.unwrap_or(window.default);
        let (priority, corrected) = window.coerce(requested);

        let task_id = job.task_id().to_string();
        let kind = job.kind();
        if self.queue.push(priority, job).is_err() {
            warn!(
                task_id = %task_id,
                task_name = %kind,
                "Task engine is stopping, rejecting task"
            );
            return Err(Error::ShuttingDown);
        }

        if corrected {
            warn!(
                task_id = %task_id,
                requested,
                priority,
                "Priority outside [{}, {}], using default",
                window.highest,
                window.lowest
            );
        }
        info!(
            task_id = %task_id,
            task_name = %kind,
            priority,
            "Task queued"
        );
        Ok(priority)
    }

    /// Dispatch loop. Returns once the shutdown sentinel has been processed.
    pub async fn run(&self) {
        info!(
            max_concurrent_tasks = self.config.max_concurrent_tasks,
            "Task engine started"
        );

        loop {
            let entry = self.queue.pop().await;
            let priority = entry.priority;
            let Some(job) = entry.job else {
                self.queue.task_done();
                debug!("Shutdown sentinel received");
                break;
            };

            let permit = match self.slots.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(
                        task_id = %job.task_id(),
                        error = %e,
                        "Failed to acquire a task slot, dropping task"
                    );
                    self.queue.task_done();
                    continue;
                }
            };

            self.queue.task_done();
            self.dispatch(job, priority, permit);
        }

        info!("Task engine stopped");
    }

    fn dispatch(&self, job: MediaJob, priority: i32, permit: OwnedSemaphorePermit) {
        let task_id = job.task_id().to_string();
        let kind = job.kind();
        let span = info_span!("task", task_id = %task_id, task_name = %kind, priority);
        let reporter = self.reporter.clone();

        debug!(parent: &span, active = self.active_count(), "Dispatching task");

        let run_span = span.clone();
        self.tracker.spawn(
            async move {
                let _permit = permit;

                let run = tokio::spawn(
                    async move {
                        let mut job = job;
                        job.run(&reporter).await.inspect_err(|_| {
                            reporter.report(StatusEvent::failed(job.task_id(), job.kind()));
                        })
                    }
                    .instrument(run_span),
                );

                match run.await {
                    Ok(Ok(true)) => info!("Task completed"),
                    Ok(Ok(false)) => warn!("Task failed"),
                    Ok(Err(e)) => error!(error = %e, "Task aborted"),
                    Err(e) if e.is_panic() => error!("Task panicked"),
                    Err(e) => error!(error = %e, "Task was cancelled"),
                }
            }
            .instrument(span),
        );
    }

    /// Ask the dispatch loop to exit and wait until the queue is drained.
    ///
    /// Entries queued before this call are still dispatched. Jobs that are
    /// already running are not waited for; see [`wait_idle`](Self::wait_idle).
    /// The dispatch loop must be running for this to return.
    pub async fn stop(&self) {
        let queued = self.size();
        if !self.queue.close(self.config.priority.lowest) {
            debug!("Task engine stop already requested");
            return;
        }

        info!(queued, "Stopping task engine");
        self.queue.join().await;
        info!(active = self.active_count(), "Task queue drained");
    }

    /// Wait up to `timeout` for every dispatched job to finish.
    ///
    /// Returns `true` if the engine went idle in time.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let idle = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        if !idle {
            warn!(
                active = self.active_count(),
                "Running tasks did not finish within {:?}",
                timeout
            );
        }
        idle
    }

    /// Entries waiting in the queue.
    pub fn size(&self) -> usize {
        self.queue.len()
    }

    /// Jobs holding a slot.
    pub fn active_count(&self) -> usize {
        self.config
            .max_concurrent_tasks
            .max(1)
            .saturating_sub(self.slots.available_permits())
    }

    pub fn is_stopping(&self) -> bool {
        self.queue.is_closed()
    }
}
