use super::{
    common::{created_response, map_service_error, success_response, validate_input},
    identity::CallerIdentity,
};
use crate::{
    errors::ApiError,
    services::{checkout::CheckoutRequest, orders::OrderSummary},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(submit_checkout))
        .route("/orders/:order_id/confirmation", post(request_confirmation))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmationBody {
    #[validate(email)]
    pub email: String,
}

/// Prices, charges and records the submitted cart. Malformed submissions
/// are rejected by the orchestrator as invalid carts.
async fn submit_checkout(
    State(state): State<Arc<AppState>>,
    CallerIdentity(identity): CallerIdentity,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let placed = state
        .services
        .checkout
        .submit(identity.as_ref(), payload)
        .await?;

    Ok(created_response(OrderSummary::from(&placed)))
}

async fn request_confirmation(
    State(state): State<Arc<AppState>>,
    CallerIdentity(identity): CallerIdentity,
    Path(order_id): Path<i32>,
    Json(payload): Json<ConfirmationBody>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let request = state
        .services
        .orders
        .request_confirmation(
            order_id,
            &payload.email,
            identity.as_ref().and_then(|i| i.user_id()),
        )
        .await
        .map_err(map_service_error)?;

    Ok(success_response(request))
}
