use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use jam_core::ServiceError;

use crate::model::{TaskHandle, TaskPatch, TaskStatus};
use crate::registry::TaskRegistry;

/// Configuration for the executor worker pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of executors running at once. Further submissions
    /// stay PENDING until a slot frees up.
    pub max_concurrent: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

/// Write handle given to an executor for its own task.
///
/// The executor reports `total` once and `progress` after each committed
/// item; the terminal state is written by the pool from the executor's
/// return value.
#[derive(Clone)]
pub struct TaskReporter {
    id: String,
    registry: Arc<TaskRegistry>,
}

impl TaskReporter {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// PENDING → IN_PROGRESS with the unit-of-work size now known.
    pub fn start(&self, total: u64, detail: &str) -> Result<(), ServiceError> {
        self.registry.update(
            &self.id,
            TaskPatch::default()
                .status(TaskStatus::InProgress)
                .total(total)
                .detail(detail),
        )?;
        Ok(())
    }

    /// Record `done` items completed.
    pub fn advance(&self, done: u64) -> Result<(), ServiceError> {
        self.registry
            .update(&self.id, TaskPatch::default().progress(done))?;
        Ok(())
    }
}

/// Bounded pool that runs executors off the request path.
///
/// Each submission becomes its own tokio task; a semaphore caps how many
/// run concurrently. Whatever the executor returns, including a panic, ends
/// up as the task's terminal state and never reaches the HTTP caller.
pub struct WorkerPool {
    registry: Arc<TaskRegistry>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl WorkerPool {
    pub fn new(registry: Arc<TaskRegistry>, config: WorkerConfig) -> Self {
        info!(
            "task worker pool started (max_concurrent={})",
            config.max_concurrent
        );
        Self {
            registry,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Stop starting new executors. Running executors finish normally;
    /// queued ones are marked FAILED.
    pub fn shutdown(&self) {
        info!("task worker pool shutting down");
        self.cancel.cancel();
        self.tracker.close();
    }

    /// Wait until every submitted task has reached a terminal state.
    /// Only returns after [`WorkerPool::shutdown`].
    pub async fn drain(&self) {
        if !self.tracker.is_empty() {
            info!("waiting for {} bulk task(s) to finish", self.tracker.len());
        }
        self.tracker.wait().await;
        info!("task worker pool drained");
    }

    /// Create a PENDING task and schedule `job` for it.
    ///
    /// `job` returns the final detail message on success. Returns as soon as
    /// the task is recorded; must be called from within a tokio runtime.
    pub fn submit<F, Fut>(&self, kind: &'static str, job: F) -> Result<TaskHandle, ServiceError>
    where
        F: FnOnce(TaskReporter) -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, ServiceError>> + Send + 'static,
    {
        let id = self.registry.create()?;
        info!(task_id = %id, kind, "task submitted");

        let reporter = TaskReporter {
            id: id.clone(),
            registry: Arc::clone(&self.registry),
        };
        self.tracker.spawn(run(
            kind,
            reporter,
            Arc::clone(&self.permits),
            self.cancel.clone(),
            job,
        ));

        Ok(TaskHandle {
            task_id: id,
            status: TaskStatus::Pending,
        })
    }
}

async fn run<F, Fut>(
    kind: &'static str,
    reporter: TaskReporter,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    job: F,
) where
    F: FnOnce(TaskReporter) -> Fut + Send + 'static,
    Fut: Future<Output = Result<String, ServiceError>> + Send + 'static,
{
    let id = reporter.id.clone();
    let registry = Arc::clone(&reporter.registry);

    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = permits.acquire_owned() => permit.ok(),
    };
    let Some(_permit) = permit else {
        finish(
            &registry,
            &id,
            TaskPatch::default()
                .status(TaskStatus::Failed)
                .detail("worker pool is shutting down"),
        );
        return;
    };

    debug!(task_id = %id, kind, "executor started");

    // Run in a nested task so a panic is caught as a JoinError.
    let patch = match tokio::spawn(job(reporter)).await {
        Ok(Ok(detail)) => {
            info!(task_id = %id, kind, "task succeeded: {detail}");
            TaskPatch::default().status(TaskStatus::Success).detail(detail)
        }
        Ok(Err(e)) => {
            warn!(task_id = %id, kind, "task failed: {e}");
            TaskPatch::default()
                .status(TaskStatus::Failed)
                .detail(e.to_string())
        }
        Err(e) => {
            error!(task_id = %id, kind, "executor aborted: {e}");
            TaskPatch::default()
                .status(TaskStatus::Failed)
                .detail(format!("executor aborted: {e}"))
        }
    };

    finish(&registry, &id, patch);
}

fn finish(registry: &TaskRegistry, id: &str, patch: TaskPatch) {
    if let Err(e) = registry.update(id, patch) {
        error!(task_id = %id, "failed to record terminal state: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pool(max_concurrent: usize) -> WorkerPool {
        WorkerPool::new(
            Arc::new(TaskRegistry::new()),
            WorkerConfig { max_concurrent },
        )
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn submit_returns_pending_handle() {
        let pool = pool(1);
        let handle = pool
            .submit("test.noop", |_r| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, ServiceError>("done".to_string())
            })
            .unwrap();
        assert_eq!(handle.status, TaskStatus::Pending);
        assert!(pool.registry().get(&handle.task_id).is_ok());
    }

    #[tokio::test]
    async fn success_records_detail_and_progress() {
        let pool = pool(2);
        let handle = pool
            .submit("test.count", |r| async move {
                r.start(3, "counting")?;
                for i in 1..=3 {
                    r.advance(i)?;
                }
                Ok::<_, ServiceError>("counted".to_string())
            })
            .unwrap();

        let task = pool
            .registry()
            .wait_terminal(&handle.task_id, WAIT)
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(task.total, 3);
        assert_eq!(task.progress, 3);
        assert_eq!(task.detail.as_deref(), Some("counted"));
    }

    #[tokio::test]
    async fn error_becomes_failed_with_partial_progress() {
        let pool = pool(1);
        let handle = pool
            .submit("test.fail", |r| async move {
                r.start(5, "working")?;
                r.advance(1)?;
                r.advance(2)?;
                Err::<String, _>(ServiceError::Storage("disk on fire".into()))
            })
            .unwrap();

        let task = pool
            .registry()
            .wait_terminal(&handle.task_id, WAIT)
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.progress, 2);
        assert_eq!(task.total, 5);
        assert_eq!(task.detail.as_deref(), Some("disk on fire"));
    }

    #[tokio::test]
    async fn panic_becomes_failed() {
        let pool = pool(1);
        let handle = pool
            .submit("test.panic", |_r| async move {
                if true {
                    panic!("boom");
                }
                Ok::<_, ServiceError>(String::new())
            })
            .unwrap();

        let task = pool
            .registry()
            .wait_terminal(&handle.task_id, WAIT)
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.detail.unwrap().starts_with("executor aborted"));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let pool = pool(1);
        let gate = Arc::new(tokio::sync::Notify::new());

        let first = {
            let gate = Arc::clone(&gate);
            pool.submit("test.block", move |r| async move {
                r.start(1, "blocked")?;
                gate.notified().await;
                Ok::<_, ServiceError>("released".to_string())
            })
            .unwrap()
        };
        let second = pool
            .submit("test.queued", |_r| async { Ok::<_, ServiceError>("ran".to_string()) })
            .unwrap();

        // Give the first executor time to take the only slot.
        let first_task = pool
            .registry()
            .poll(&first.task_id, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(first_task.status, TaskStatus::InProgress);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            pool.registry().get(&second.task_id).unwrap().status,
            TaskStatus::Pending
        );

        gate.notify_one();
        let second_task = pool
            .registry()
            .wait_terminal(&second.task_id, WAIT)
            .await
            .unwrap();
        assert_eq!(second_task.status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn shutdown_fails_queued_tasks() {
        let pool = pool(1);
        pool.shutdown();
        let handle = pool
            .submit("test.late", |_r| async { Ok::<_, ServiceError>("never".to_string()) })
            .unwrap();

        let task = pool
            .registry()
            .wait_terminal(&handle.task_id, WAIT)
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.detail.as_deref(), Some("worker pool is shutting down"));
    }

    #[tokio::test]
    async fn drain_waits_for_running_executors() {
        let pool = pool(1);
        let running = pool
            .submit("test.slow", |r| async move {
                r.start(1, "working")?;
                tokio::time::sleep(Duration::from_millis(50)).await;
                r.advance(1)?;
                Ok::<_, ServiceError>("finished".to_string())
            })
            .unwrap();
        let queued = pool
            .submit("test.queued", |_r| async { Ok::<_, ServiceError>("ran".to_string()) })
            .unwrap();

        // Let the first executor take the only permit.
        let first = pool
            .registry()
            .poll(&running.task_id, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(first.status, TaskStatus::InProgress);

        pool.shutdown();
        tokio::time::timeout(WAIT, pool.drain()).await.unwrap();

        let running = pool.registry().get(&running.task_id).unwrap();
        assert_eq!(running.status, TaskStatus::Success);
        assert_eq!(running.progress, 1);
        let queued = pool.registry().get(&queued.task_id).unwrap();
        assert_eq!(queued.status, TaskStatus::Failed);
        assert_eq!(queued.detail.as_deref(), Some("worker pool is shutting down"));
    }
}
