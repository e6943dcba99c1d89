use super::{
    common::{
        created_response, map_service_error, success_response, validate_input, PaginatedResponse,
        PaginationParams,
    },
    identity::RequireIdentity,
};
use crate::{
    errors::ApiError,
    models::Identity,
    services::{
        orders::OrderSummary,
        users::{RegisterUserInput, UpdateProfileInput},
    },
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

pub fn users_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(register_user))
        .route("/check-email", post(check_email))
        .route("/:user_id/profile", get(get_profile).put(update_profile))
        .route("/:user_id/orders", get(list_user_orders))
        .route("/:user_id/orders/recent", get(recent_user_orders))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckEmailRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct CheckEmailResponse {
    pub registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<u64>,
}

/// Profiles and order history are only visible to the user they belong to.
fn ensure_self(identity: &Identity, user_id: i32) -> Result<(), ApiError> {
    if identity.user_id() == Some(user_id) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized(
            "only available to the account owner".to_string(),
        ))
    }
}

async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let registered = state
        .services
        .users
        .register(payload)
        .await
        .map_err(map_service_error)?;

    info!(user_id = registered.user.id, "User registered via API");
    Ok(created_response(registered))
}

/// Lets guest checkout suggest signing in when the email already has an
/// account.
async fn check_email(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CheckEmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let username = state
        .services
        .users
        .email_registered(&payload.email)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(CheckEmailResponse {
        registered: username.is_some(),
        username,
    }))
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
    Path(user_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_self(&identity, user_id)?;

    let profile = state
        .services
        .users
        .profile_of(user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(profile))
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
    Path(user_id): Path<i32>,
    Json(payload): Json<UpdateProfileInput>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_self(&identity, user_id)?;
    validate_input(&payload)?;

    let profile = state
        .services
        .users
        .update_profile(user_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(profile))
}

async fn list_user_orders(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
    Path(user_id): Path<i32>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_self(&identity, user_id)?;

    let per_page = params.per_page.unwrap_or(state.config.orders_page_size);
    let page = state
        .services
        .orders
        .find_by_user_paged(user_id, params.page, per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        page.orders.iter().map(OrderSummary::from).collect(),
        page.page,
        page.per_page,
        page.total_items,
        page.total_pages,
    )))
}

async fn recent_user_orders(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
    Path(user_id): Path<i32>,
    Query(query): Query<RecentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_self(&identity, user_id)?;

    let limit = query.limit.unwrap_or(state.config.recent_orders_default);
    let orders = state
        .services
        .orders
        .find_recent(user_id, limit)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(
        orders.iter().map(OrderSummary::from).collect::<Vec<_>>(),
    ))
}
