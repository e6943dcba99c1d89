use super::{
    common::{map_service_error, success_response, validate_input},
    identity::CallerIdentity,
};
use crate::{
    errors::ApiError,
    models::Identity,
    services::orders::{OrderItemView, OrderSummary},
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
use validator::Validate;

pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:order_id", get(get_order))
        .route("/:order_id/items", get(get_order_items))
        .route("/:order_id/exists", post(order_exists))
}

/// Proof of ownership: the contact email given at checkout.
#[derive(Debug, Deserialize, Validate)]
pub struct OrderOwnerQuery {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub order_id: i32,
    pub exists: bool,
}

fn caller_user_id(identity: &Option<Identity>) -> Option<i32> {
    identity.as_ref().and_then(Identity::user_id)
}

/// Looks up an order the caller owns. Orders owned by someone else are
/// reported as missing.
async fn owned_order(
    state: &AppState,
    order_id: i32,
    email: &str,
    user_id: Option<i32>,
) -> Result<(), ApiError> {
    let owned = state
        .services
        .orders
        .exists(order_id, email, user_id)
        .await
        .map_err(map_service_error)?;
    if owned {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!("Order {} not found", order_id)))
    }
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    CallerIdentity(identity): CallerIdentity,
    Path(order_id): Path<i32>,
    Query(owner): Query<OrderOwnerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&owner)?;
    owned_order(&state, order_id, &owner.email, caller_user_id(&identity)).await?;

    let order = state
        .services
        .orders
        .find_by_id(order_id)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Order {} not found", order_id)))?;

    Ok(success_response(OrderSummary::from(&order)))
}

async fn get_order_items(
    State(state): State<Arc<AppState>>,
    CallerIdentity(identity): CallerIdentity,
    Path(order_id): Path<i32>,
    Query(owner): Query<OrderOwnerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&owner)?;
    owned_order(&state, order_id, &owner.email, caller_user_id(&identity)).await?;

    let items = state
        .services
        .orders
        .list_items(order_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(
        items.iter().map(OrderItemView::from).collect::<Vec<_>>(),
    ))
}

/// "Did my order go through?"
async fn order_exists(
    State(state): State<Arc<AppState>>,
    CallerIdentity(identity): CallerIdentity,
    Path(order_id): Path<i32>,
    Json(payload): Json<OrderOwnerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let exists = state
        .services
        .orders
        .exists(order_id, &payload.email, caller_user_id(&identity))
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ExistsResponse { order_id, exists }))
}
