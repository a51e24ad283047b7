use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::sync::Notify;

use jam_core::{new_id, now_rfc3339, ServiceError};

use crate::model::{Task, TaskPatch, TaskStatus};

/// Upper bound for a single long-poll wait.
pub const MAX_POLL_SECS: u64 = 120;

/// Process-local task registry.
///
/// Maps task id to its current [`Task`] record. Nothing is persisted and
/// records are never evicted. Each task has one writer (its executor);
/// the lock only keeps the map itself consistent across tasks and prevents
/// torn reads while a status poll races a progress update.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Task>>,
    /// Woken on every change (used by long-poll).
    notify: Notify,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    /// Allocate a fresh id and insert a PENDING record for it.
    pub fn create(&self) -> Result<String, ServiceError> {
        let id = new_id();
        let task = Task::pending(id.clone(), now_rfc3339());

        self.tasks
            .write()
            .map_err(|e| ServiceError::Internal(format!("task registry poisoned: {e}")))?
            .insert(id.clone(), task);

        self.notify.notify_waiters();
        Ok(id)
    }

    /// Current snapshot of a task.
    pub fn get(&self, id: &str) -> Result<Task, ServiceError> {
        self.tasks
            .read()
            .map_err(|e| ServiceError::Internal(format!("task registry poisoned: {e}")))?
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound("Task not found".into()))
    }

    /// Merge `patch` into the task and return the updated snapshot.
    ///
    /// A terminal task rejects further changes, and `progress` never moves
    /// backwards. Timestamps follow the status: `started_at` on the first
    /// IN_PROGRESS, `ended_at` on the terminal transition.
    pub fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, ServiceError> {
        let updated = {
            let mut tasks = self
                .tasks
                .write()
                .map_err(|e| ServiceError::Internal(format!("task registry poisoned: {e}")))?;
            let task = tasks
                .get_mut(id)
                .ok_or_else(|| ServiceError::NotFound("Task not found".into()))?;

            if task.status.is_terminal() {
                return Err(ServiceError::Validation(format!(
                    "task {id} is already {}",
                    task.status
                )));
            }

            if matches!(patch.progress, Some(p) if p < task.progress) {
                return Err(ServiceError::Validation(format!(
                    "task {id} progress cannot move backwards from {}",
                    task.progress
                )));
            }
            if patch.status == Some(TaskStatus::Pending) {
                return Err(ServiceError::Validation(format!(
                    "task {id} cannot return to PENDING"
                )));
            }

            if let Some(progress) = patch.progress {
                task.progress = progress;
            }
            if let Some(total) = patch.total {
                task.total = total;
            }
            if let Some(detail) = patch.detail {
                task.detail = Some(detail);
            }
            if let Some(status) = patch.status {
                match status {
                    TaskStatus::Pending => {}
                    TaskStatus::InProgress => {
                        if task.started_at.is_none() {
                            task.started_at = Some(now_rfc3339());
                        }
                    }
                    TaskStatus::Success | TaskStatus::Failed => {
                        task.ended_at = Some(now_rfc3339());
                    }
                }
                task.status = status;
            }
            task.clone()
        };

        self.notify.notify_waiters();
        Ok(updated)
    }

    /// Long-poll: wait up to `timeout` for this task to change, then return
    /// the current snapshot. Returns immediately if the task is terminal.
    pub async fn poll(&self, id: &str, timeout: Duration) -> Result<Task, ServiceError> {
        let timeout = timeout.min(Duration::from_secs(MAX_POLL_SECS));
        let deadline = tokio::time::Instant::now() + timeout;

        // Register the waiter BEFORE reading the snapshot. notify_waiters()
        // stores no permit, so a change landing between the read and the
        // select! would otherwise be missed.
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let snapshot = self.get(id)?;
        if snapshot.status.is_terminal() {
            return Ok(snapshot);
        }

        loop {
            tokio::select! {
                _ = &mut notified => {
                    // Re-arm first, same ordering as above.
                    notified.set(self.notify.notified());
                    notified.as_mut().enable();
                    let current = self.get(id)?;
                    if current != snapshot {
                        return Ok(current);
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return self.get(id);
                }
            }
        }
    }
}

#[cfg(test)]
impl TaskRegistry {
    /// Wait until the task is terminal or `timeout` elapses, returning the
    /// last snapshot either way.
    pub async fn wait_terminal(&self, id: &str, timeout: Duration) -> Result<Task, ServiceError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let task = self.poll(id, remaining).await?;
            if task.status.is_terminal() || remaining.is_zero() {
                return Ok(task);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn create_and_get() {
        let registry = TaskRegistry::new();
        let id = registry.create().unwrap();

        let task = registry.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
        assert_eq!(task.total, 0);
        assert!(task.detail.is_none());
    }

    #[test]
    fn ids_are_unique() {
        let registry = TaskRegistry::new();
        let a = registry.create().unwrap();
        let b = registry.create().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = TaskRegistry::new();
        let err = registry.get("does-not-exist").unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = registry
            .update("does-not-exist", TaskPatch::default().progress(1))
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn lifecycle_sets_timestamps() {
        let registry = TaskRegistry::new();
        let id = registry.create().unwrap();

        let task = registry
            .update(
                &id,
                TaskPatch::default()
                    .status(TaskStatus::InProgress)
                    .total(2)
                    .detail("In progress..."),
            )
            .unwrap();
        assert_eq!(task.total, 2);
        assert!(task.started_at.is_some());
        assert!(task.ended_at.is_none());

        registry.update(&id, TaskPatch::default().progress(1)).unwrap();
        registry.update(&id, TaskPatch::default().progress(2)).unwrap();

        let done = registry
            .update(
                &id,
                TaskPatch::default()
                    .status(TaskStatus::Success)
                    .detail("Transfer complete."),
            )
            .unwrap();
        assert_eq!(done.status, TaskStatus::Success);
        assert_eq!(done.progress, 2);
        assert!(done.ended_at.is_some());
    }

    #[test]
    fn progress_never_regresses() {
        let registry = TaskRegistry::new();
        let id = registry.create().unwrap();
        registry.update(&id, TaskPatch::default().progress(5)).unwrap();

        assert!(registry.update(&id, TaskPatch::default().progress(3)).is_err());
        assert_eq!(registry.get(&id).unwrap().progress, 5);
    }

    #[test]
    fn terminal_is_final() {
        let registry = TaskRegistry::new();
        let id = registry.create().unwrap();
        registry
            .update(&id, TaskPatch::default().status(TaskStatus::Failed).detail("boom"))
            .unwrap();

        assert!(registry
            .update(&id, TaskPatch::default().status(TaskStatus::InProgress))
            .is_err());
        assert!(registry.update(&id, TaskPatch::default().progress(1)).is_err());

        let task = registry.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.detail.as_deref(), Some("boom"));
    }

    #[test]
    fn cannot_return_to_pending() {
        let registry = TaskRegistry::new();
        let id = registry.create().unwrap();
        registry
            .update(&id, TaskPatch::default().status(TaskStatus::InProgress))
            .unwrap();
        assert!(registry
            .update(&id, TaskPatch::default().status(TaskStatus::Pending))
            .is_err());
    }

    #[tokio::test]
    async fn poll_returns_immediately_when_terminal() {
        let registry = TaskRegistry::new();
        let id = registry.create().unwrap();
        registry
            .update(&id, TaskPatch::default().status(TaskStatus::Success))
            .unwrap();

        let started = tokio::time::Instant::now();
        let task = registry.poll(&id, Duration::from_secs(30)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn poll_times_out_with_current_state() {
        let registry = TaskRegistry::new();
        let id = registry.create().unwrap();

        let task = registry.poll(&id, Duration::from_millis(20)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn poll_wakes_on_change() {
        let registry = Arc::new(TaskRegistry::new());
        let id = registry.create().unwrap();

        let writer = {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                registry
                    .update(&id, TaskPatch::default().status(TaskStatus::InProgress).total(7))
                    .unwrap();
            })
        };

        let task = registry.poll(&id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.total, 7);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn poll_ignores_other_tasks() {
        let registry = Arc::new(TaskRegistry::new());
        let watched = registry.create().unwrap();
        let other = registry.create().unwrap();

        {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                registry
                    .update(&other, TaskPatch::default().progress(1))
                    .unwrap();
            });
        }

        let task = registry
            .poll(&watched, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
    }

    #[tokio::test]
    async fn unknown_task_poll_is_not_found() {
        let registry = TaskRegistry::new();
        let err = registry
            .poll("nope", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn poisoned_registry_reports_internal_error() {
        let registry = Arc::new(TaskRegistry::new());
        let id = registry.create().unwrap();

        let poisoner = Arc::clone(&registry);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.tasks.write().unwrap();
            panic!("poison the registry lock");
        })
        .join();

        assert!(matches!(registry.get(&id), Err(ServiceError::Internal(_))));
        assert!(matches!(registry.create(), Err(ServiceError::Internal(_))));
        assert!(matches!(
            registry.update(&id, TaskPatch::default().progress(1)),
            Err(ServiceError::Internal(_))
        ));
    }
}
