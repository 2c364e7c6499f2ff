use axum::{extract::State, routing::get, Json, Router};
use axum_extra::extract::WithRejection;
use tracing::{info, instrument};

use super::dto::{CompanyCreateRequest, CompanyResponse};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
    store::NewCompany,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/companies", get(list_companies).post(create_company))
}

#[utoipa::path(
    get,
    path = "/companies",
    tag = "companies",
    responses((status = 200, description = "All companies", body = [CompanyResponse]))
)]
#[instrument(skip(state))]
pub async fn list_companies(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<CompanyResponse>>> {
    let companies = state.companies.list_companies().await?;
    Ok(Json(companies.into_iter().map(CompanyResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/companies",
    tag = "companies",
    request_body = CompanyCreateRequest,
    responses(
        (status = 200, description = "Company created", body = CompanyResponse),
        (status = 409, description = "Company name already exists"),
        (status = 422, description = "Empty company name"),
    )
)]
#[instrument(skip(state, payload))]
pub async fn create_company(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<CompanyCreateRequest>, AppError>,
) -> AppResult<Json<CompanyResponse>> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Company name must not be empty".into()));
    }

    let company = state
        .companies
        .create_company(NewCompany {
            name: name.to_string(),
            address: payload.address,
        })
        .await?;
    info!(id = company.id, "company created");
    Ok(Json(company.into()))
}
