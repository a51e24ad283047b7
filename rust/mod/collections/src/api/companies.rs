use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use jam_core::ServiceError;

use crate::api::AppState;
use crate::model::CompanyList;

pub fn routes() -> Router<AppState> {
    Router::new().route("/companies", get(list_companies))
}

async fn list_companies(State(state): State<AppState>) -> Result<Json<CompanyList>, ServiceError> {
    let companies = state.store.run_blocking(|s| s.list_companies()).await?;
    Ok(Json(CompanyList {
        total: companies.len(),
        companies,
    }))
}
