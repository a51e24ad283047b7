pub mod api;
pub mod bulk;
pub mod model;
pub mod seed;
pub mod store;

use std::sync::Arc;

use axum::Router;
use jam_core::Module;
use task::WorkerPool;

pub use bulk::{BulkConfig, BulkExecutor, BulkOp};
pub use store::CollectionStore;

/// Collections Module: companies, collections, and bulk association tasks.
pub struct CollectionsModule {
    state: api::AppState,
}

impl CollectionsModule {
    /// Bulk executors are scheduled on `pool`; their progress is read
    /// through the task module's routes.
    pub fn new(store: Arc<CollectionStore>, pool: Arc<WorkerPool>, config: BulkConfig) -> Self {
        let executor = BulkExecutor::new(Arc::clone(&store), config);
        Self {
            state: api::AppState {
                store,
                pool,
                executor,
            },
        }
    }

    pub fn store(&self) -> &Arc<CollectionStore> {
        &self.state.store
    }
}

impl Module for CollectionsModule {
    fn name(&self) -> &str {
        "collections"
    }

    fn routes(&self) -> Router {
        api::build_router(self.state.clone())
    }
}
