use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use uuid::Uuid;

use jam_core::ServiceError;

use crate::api::AppState;
use crate::model::{Collection, CollectionDetail, CompanyAssociationIn, MessageOut};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/collections", get(list_collections))
        .route("/collections/{collection_id}", get(get_collection))
        .route("/collections/{collection_id}/companies", post(add_company))
        .route(
            "/collections/{collection_id}/companies/{company_id}",
            delete(remove_company),
        )
}

async fn list_collections(
    State(state): State<AppState>,
) -> Result<Json<Vec<Collection>>, ServiceError> {
    Ok(Json(state.store.run_blocking(|s| s.list_collections()).await?))
}

async fn get_collection(
    State(state): State<AppState>,
    Path(collection_id): Path<Uuid>,
) -> Result<Json<CollectionDetail>, ServiceError> {
    let detail = state
        .store
        .run_blocking(move |s| {
            let collection = s
                .get_collection(collection_id)?
                .ok_or_else(|| ServiceError::NotFound("Collection not found".into()))?;
            let companies = s.collection_companies(collection_id)?;
            Ok(CollectionDetail {
                id: collection.id,
                collection_name: collection.collection_name,
                total: companies.len(),
                companies,
            })
        })
        .await?;
    Ok(Json(detail))
}

async fn add_company(
    State(state): State<AppState>,
    Path(collection_id): Path<Uuid>,
    Json(input): Json<CompanyAssociationIn>,
) -> Result<(StatusCode, Json<MessageOut>), ServiceError> {
    let company_id = input.company_id;
    state
        .store
        .run_blocking(move |s| {
            if s.get_company(company_id)?.is_none() {
                return Err(ServiceError::NotFound("Company not found".into()));
            }
            if s.get_collection(collection_id)?.is_none() {
                return Err(ServiceError::NotFound("Collection not found".into()));
            }
            s.add_association(company_id, collection_id)
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageOut {
            message: "Company added to collection successfully".into(),
        }),
    ))
}

async fn remove_company(
    State(state): State<AppState>,
    Path((collection_id, company_id)): Path<(Uuid, i64)>,
) -> Result<StatusCode, ServiceError> {
    state
        .store
        .run_blocking(move |s| s.remove_association(company_id, collection_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
