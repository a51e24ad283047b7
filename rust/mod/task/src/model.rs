use serde::{Deserialize, Serialize};

/// Reported when a task has no detail message yet.
pub const NO_DETAILS: &str = "No details available.";

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a bulk task.
///
/// ```text
/// PENDING → IN_PROGRESS → SUCCESS
///                       → FAILED
/// ```
///
/// A task may also fail straight from PENDING (e.g. the worker pool is shut
/// down before the executor starts). Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the task has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Task: one record in the registry
// ---------------------------------------------------------------------------

/// A single bulk operation tracked by the registry.
///
/// Owned by exactly one executor for its whole lifetime; the registry only
/// guards the map so readers never see a half-written record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    /// Work items completed so far.
    #[serde(default)]
    pub progress: u64,
    /// Work items determined when the executor started.
    #[serde(default)]
    pub total: u64,
    /// Human-readable progress message, or the error text on FAILED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
}

impl Task {
    /// A fresh PENDING record with zeroed counters.
    pub fn pending(id: String, created_at: String) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            progress: 0,
            total: 0,
            detail: None,
            created_at,
            started_at: None,
            ended_at: None,
        }
    }
}

/// Partial update merged into a [`Task`] by `TaskRegistry::update`.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub progress: Option<u64>,
    pub total: Option<u64>,
    pub detail: Option<String>,
}

impl TaskPatch {
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Returned by every submission endpoint (`202 Accepted`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: String,
    pub status: TaskStatus,
}

/// Body of `GET /actions/tasks/{task_id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusOut {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: u64,
    pub total: u64,
    pub detail: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
}

impl From<&Task> for TaskStatusOut {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            status: task.status,
            progress: task.progress,
            total: task.total,
            detail: task
                .detail
                .clone()
                .unwrap_or_else(|| NO_DETAILS.to_string()),
            created_at: task.created_at.clone(),
            started_at: task.started_at.clone(),
            ended_at: task.ended_at.clone(),
        }
    }
}

/// Query parameters for `GET /actions/tasks/{task_id}/poll`.
#[derive(Debug, Deserialize)]
pub struct PollQuery {
    /// Max seconds to block (default 30, max 120).
    #[serde(default = "default_poll_timeout")]
    pub timeout: u64,
}

fn default_poll_timeout() -> u64 {
    30
}

impl Default for PollQuery {
    fn default() -> Self {
        Self {
            timeout: default_poll_timeout(),
        }
    }
}
