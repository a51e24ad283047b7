mod actions;
mod collections;
mod companies;

use std::sync::Arc;

use axum::Router;

use task::WorkerPool;

use crate::bulk::BulkExecutor;
use crate::store::CollectionStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CollectionStore>,
    pub pool: Arc<WorkerPool>,
    pub executor: BulkExecutor,
}

/// Build the companies, collections, and bulk actions router.
///
/// Routes carry their full paths; the caller merges them at the root.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(companies::routes())
        .merge(collections::routes())
        .merge(actions::routes())
        .with_state(state)
}
