pub mod api;
pub mod model;
pub mod registry;
pub mod worker;

use std::sync::Arc;

use axum::Router;
use jam_core::Module;

pub use model::{Task, TaskHandle, TaskPatch, TaskStatus, TaskStatusOut};
pub use registry::TaskRegistry;
pub use worker::{TaskReporter, WorkerConfig, WorkerPool};

/// The Task module: process-local bulk task tracking.
///
/// Owns the registry and the worker pool. Business modules submit executors
/// through [`TaskModule::pool`]; clients read progress through the status
/// routes this module contributes.
pub struct TaskModule {
    pool: Arc<WorkerPool>,
}

impl TaskModule {
    pub fn new() -> Self {
        Self::with_config(WorkerConfig::default())
    }

    /// Create with explicit worker configuration.
    pub fn with_config(worker_config: WorkerConfig) -> Self {
        let registry = Arc::new(TaskRegistry::new());
        Self {
            pool: Arc::new(WorkerPool::new(registry, worker_config)),
        }
    }

    /// The pool executors are submitted to.
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        self.pool.registry()
    }
}

impl Default for TaskModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for TaskModule {
    fn name(&self) -> &str {
        "task"
    }

    fn routes(&self) -> Router {
        api::router(Arc::clone(self.registry()))
    }
}
