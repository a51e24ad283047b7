use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};

use jam_core::ServiceError;
use task::TaskHandle;

use crate::api::AppState;
use crate::bulk::BulkOp;
use crate::model::{BulkDeleteIn, BulkTransferIn, SelectiveDeleteIn, SelectiveTransferIn};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/actions/transfer-collection", post(transfer_collection))
        .route("/actions/transfer-selection", post(transfer_selection))
        .route("/actions/collection-contents", delete(delete_collection_contents))
        .route("/actions/delete-selection", post(delete_selection))
}

type Accepted = (StatusCode, Json<TaskHandle>);

/// Schedule `op` on the worker pool and answer without waiting for it.
fn submit(state: &AppState, op: BulkOp) -> Result<Accepted, ServiceError> {
    let executor = state.executor.clone();
    let handle = state
        .pool
        .submit(op.kind(), move |reporter| async move { executor.run(op, reporter).await })?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

async fn transfer_collection(
    State(state): State<AppState>,
    Json(input): Json<BulkTransferIn>,
) -> Result<Accepted, ServiceError> {
    submit(
        &state,
        BulkOp::TransferCollection {
            source: input.source_collection_id,
            destination: input.destination_collection_id,
        },
    )
}

async fn transfer_selection(
    State(state): State<AppState>,
    Json(input): Json<SelectiveTransferIn>,
) -> Result<Accepted, ServiceError> {
    submit(
        &state,
        BulkOp::TransferSelection {
            company_ids: input.company_ids,
            destination: input.destination_collection_id,
        },
    )
}

async fn delete_collection_contents(
    State(state): State<AppState>,
    Json(input): Json<BulkDeleteIn>,
) -> Result<Accepted, ServiceError> {
    submit(
        &state,
        BulkOp::DeleteContents {
            collection: input.collection_id,
        },
    )
}

async fn delete_selection(
    State(state): State<AppState>,
    Json(input): Json<SelectiveDeleteIn>,
) -> Result<Accepted, ServiceError> {
    submit(
        &state,
        BulkOp::DeleteSelection {
            collection: input.collection_id,
            company_ids: input.company_ids,
        },
    )
}
