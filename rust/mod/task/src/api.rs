use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};

use jam_core::ServiceError;

use crate::model::{PollQuery, TaskStatusOut};
use crate::registry::TaskRegistry;

type RegistryState = Arc<TaskRegistry>;

/// Task status routes.
///
/// - `GET /actions/tasks/{task_id}/status`: current snapshot
/// - `GET /actions/tasks/{task_id}/poll`: long-poll for the next change
pub fn router(registry: Arc<TaskRegistry>) -> Router {
    Router::new()
        .route("/actions/tasks/{task_id}/status", get(task_status))
        .route("/actions/tasks/{task_id}/poll", get(poll_task))
        .with_state(registry)
}

async fn task_status(
    State(registry): State<RegistryState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusOut>, ServiceError> {
    let task = registry.get(&task_id)?;
    Ok(Json(TaskStatusOut::from(&task)))
}

async fn poll_task(
    State(registry): State<RegistryState>,
    Path(task_id): Path<String>,
    Query(query): Query<PollQuery>,
) -> Result<Json<TaskStatusOut>, ServiceError> {
    let task = registry
        .poll(&task_id, Duration::from_secs(query.timeout))
        .await?;
    Ok(Json(TaskStatusOut::from(&task)))
}
