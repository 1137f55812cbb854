//! Coordinator - sequential task execution with per-file locking.
//!
//! The coordinator walks a task list strictly in order, acquires a lock for
//! every file a task declares, hands the task to a worker, and records one
//! result per task no matter what fails. Nothing in the per-task path is
//! allowed to escape as an error: lock timeouts, worker failures and
//! cancellation all land in the corresponding `WorkerResult`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::coord::events::{CoordinationEvent, EventEmitter, EventSink};
use crate::core::errors::ForemanError;
use crate::core::locking::{LockGuard, LockTable};
use crate::planner::planner::{TaskPlanner, TaskSpec};
use crate::workers::worker::{Worker, WorkerResult};

/// Tunables for one coordinator instance. Values are passed in by the
/// caller; nothing here is read from the environment.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Bounded wait for each per-file lock acquisition.
    pub lock_timeout: Duration,
    /// Optional lease on acquired locks, as self-healing against a holder
    /// that never releases.
    pub lock_expiry: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            lock_expiry: None,
        }
    }
}

/// Routes tasks to a worker and coordinates execution.
pub struct Coordinator {
    worker: Arc<dyn Worker>,
    lock_table: LockTable,
    config: CoordinatorConfig,
    events: EventEmitter,
}

impl Coordinator {
    pub fn new(worker: Arc<dyn Worker>) -> Self {
        Self {
            worker,
            lock_table: LockTable::new(),
            config: CoordinatorConfig::default(),
            events: EventEmitter::new(None),
        }
    }

    /// Share a lock table with other coordinators or test harnesses.
    pub fn with_lock_table(mut self, lock_table: LockTable) -> Self {
        self.lock_table = lock_table;
        self
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events.set_sink(sink);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.events = self.events.with_session_id(session_id);
        self
    }

    /// The table this coordinator locks against.
    pub fn lock_table(&self) -> &LockTable {
        &self.lock_table
    }

    /// Plan `request` with `planner`, announce the plan, and execute it.
    ///
    /// Emits one `TaskPlanned` event per planned task before execution
    /// begins. Planning is infallible (the planner degrades to its fallback
    /// plan), so this inherits the never-errors contract of
    /// [`execute_tasks`](Self::execute_tasks).
    pub async fn plan_and_execute(
        &self,
        planner: &TaskPlanner,
        request: &str,
        context_summary: &str,
        working_dir: &Path,
    ) -> Vec<WorkerResult> {
        let tasks = planner.plan(request, context_summary).await;
        info!(task_count = tasks.len(), "plan ready");
        for task in &tasks {
            self.events.emit(CoordinationEvent::TaskPlanned {
                task_id: task.task_id.clone(),
                description: task.description.clone(),
            });
        }
        self.execute_tasks(&tasks, working_dir).await
    }

    /// Execute `tasks` strictly in list order against `working_dir`.
    ///
    /// Returns exactly one result per input task, position-matched. Never
    /// errors: inspecting `success`/`errors` on each result is the sole
    /// failure channel. Declared `dependencies` are not re-checked here;
    /// the planner is trusted to have emitted a sound order.
    pub async fn execute_tasks(&self, tasks: &[TaskSpec], working_dir: &Path) -> Vec<WorkerResult> {
        // A receiver whose sender is already gone never cancels.
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        drop(_cancel_tx);
        self.execute_tasks_with_cancel(tasks, working_dir, cancel_rx).await
    }

    /// Like [`execute_tasks`](Self::execute_tasks), but stops starting new
    /// tasks once `cancel_rx` fires. Already-started work runs to
    /// completion; every remaining task still yields a (failed) result so
    /// the one-result-per-task contract holds.
    pub async fn execute_tasks_with_cancel(
        &self,
        tasks: &[TaskSpec],
        working_dir: &Path,
        mut cancel_rx: oneshot::Receiver<()>,
    ) -> Vec<WorkerResult> {
        let mut results: Vec<WorkerResult> = Vec::with_capacity(tasks.len());
        let mut cancelled = false;

        for task in tasks {
            if !cancelled && cancel_rx.try_recv().is_ok() {
                cancelled = true;
            }
            if cancelled {
                warn!(task_id = %task.task_id, "task loop cancelled before task started");
                let err = ForemanError::Cancelled("task loop stopped".to_string());
                results.push(WorkerResult::failed(
                    &task.task_id,
                    err.to_string(),
                    "Cancelled before execution",
                ));
                continue;
            }
            results.push(self.run_task(task, working_dir).await);
        }

        results
    }

    async fn run_task(&self, task: &TaskSpec, working_dir: &Path) -> WorkerResult {
        info!(task_id = %task.task_id, description = %task.description, "executing task");

        self.events.emit(CoordinationEvent::TaskAssigned {
            task_id: task.task_id.clone(),
            worker_id: self.worker.id().to_string(),
            description: task.description.clone(),
        });

        // Acquire a lock for every file the task declares. Guards release
        // on drop, so a partial acquisition cleans itself up and so does
        // every exit path below.
        let mut guards: Vec<LockGuard> = Vec::with_capacity(task.files.len());
        for file in &task.files {
            match self
                .lock_table
                .acquire(file, self.config.lock_timeout, self.config.lock_expiry)
                .await
            {
                Ok(guard) => guards.push(guard),
                Err(err) => {
                    error!(task_id = %task.task_id, file = %file, error = %err, "lock acquisition failed, skipping task");
                    drop(guards);
                    return WorkerResult::failed(
                        &task.task_id,
                        err.to_string(),
                        format!("Lock timeout: {err}"),
                    );
                }
            }
        }

        let result = match self.worker.execute(task, working_dir).await {
            Ok(result) => result,
            Err(err) => {
                error!(task_id = %task.task_id, error = %err, "task failed with worker error");
                WorkerResult::failed(&task.task_id, err.to_string(), format!("Exception: {err}"))
            }
        };

        self.events.emit(CoordinationEvent::WorkerCompleted {
            task_id: result.task_id.clone(),
            success: result.success,
            files_modified: result.files_modified.clone(),
            errors: result.errors.clone(),
        });

        drop(guards);
        result
    }
}
