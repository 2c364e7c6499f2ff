use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::Serialize;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    auth::{
        dto::UserResponse,
        jwt::{Admin, AuthUser, RequireRole},
    },
    error::{AppError, AppResult},
    middleware::rate_limit::rate_limit,
    state::AppState,
};

pub fn read_routes(state: &AppState) -> Router<AppState> {
    let listing = Router::new()
        .route("/users", get(list_users))
        .route_layer(from_fn_with_state(state.limiter.clone(), rate_limit));

    Router::new()
        .route("/users/:id", get(get_user).delete(delete_user))
        .merge(listing)
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/users/admin-dashboard", get(admin_dashboard))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardResponse {
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    responses(
        (status = 200, description = "All users", body = [UserResponse]),
        (status = 429, description = "Too many requests"),
    )
)]
#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserResponse>>> {
    let users = state.users.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    security(("api_key" = [], "bearer" = [])),
    responses(
        (status = 200, description = "The user", body = UserResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "User not found"),
    )
)]
#[instrument(skip(state, _caller))]
pub async fn get_user(
    State(state): State<AppState>,
    _caller: AuthUser,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> AppResult<Json<UserResponse>> {
    let user = state
        .users
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    security(("api_key" = [], "bearer" = [])),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "User not found"),
    )
)]
#[instrument(skip(state, caller))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> AppResult<StatusCode> {
    if !state.users.delete_user(id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    info!(id, by = %caller.sub, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/users/admin-dashboard",
    tag = "users",
    security(("api_key" = [], "bearer" = [])),
    responses(
        (status = 200, description = "Admin greeting", body = DashboardResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not an admin"),
    )
)]
pub async fn admin_dashboard(admin: RequireRole<Admin>) -> Json<DashboardResponse> {
    Json(DashboardResponse {
        message: format!("Welcome to the admin dashboard, {}", admin.claims.sub),
    })
}
