use super::{
    common::{map_service_error, no_content_response, success_response, validate_input},
    identity::RequireIdentity,
};
use crate::{entities::cart_line, errors::ApiError, models::money, AppState};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Creates the router for the caller's cart
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_to_cart))
        .route("/items/:product_id", put(update_cart_item).delete(remove_cart_item))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    #[validate(range(min = 1))]
    pub product_id: i32,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub product_id: i32,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<&cart_line::Model> for CartLineView {
    fn from(line: &cart_line::Model) -> Self {
        Self {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price(),
            line_total: money::from_minor_units(
                line.unit_price_minor.saturating_mul(i64::from(line.quantity)),
            ),
        }
    }
}

/// Cart contents. Prices are those seen when each line was added and are
/// indicative only; checkout re-prices from the catalog.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub item_count: i64,
    pub indicative_total: Decimal,
}

impl CartView {
    fn new(lines: &[cart_line::Model]) -> Self {
        let lines: Vec<CartLineView> = lines.iter().map(CartLineView::from).collect();
        Self {
            item_count: lines.iter().map(|l| i64::from(l.quantity)).sum(),
            indicative_total: lines.iter().map(|l| l.line_total).sum(),
            lines,
        }
    }
}

async fn get_cart(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
) -> Result<impl IntoResponse, ApiError> {
    let lines = state
        .services
        .cart
        .list(&identity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(CartView::new(&lines)))
}

async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let line = state
        .services
        .cart
        .add(&identity, payload.product_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(CartLineView::from(&line)))
}

async fn update_cart_item(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
    Path(product_id): Path<i32>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let line = state
        .services
        .cart
        .set_quantity(&identity, product_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(CartLineView::from(&line)))
}

async fn remove_cart_item(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
    Path(product_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .cart
        .remove(&identity, product_id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

async fn clear_cart(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state
        .services
        .cart
        .clear(&identity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(serde_json::json!({ "lines_removed": removed })))
}
