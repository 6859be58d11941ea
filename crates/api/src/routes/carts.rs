//! Customer cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use document_store::DocumentStore;
use domain::{Cart, Money, OrderItem};
use serde::Deserialize;

use super::orders::domain_validation;
use super::parse_user_id;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub merchant_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

/// GET /carts/:customer_id: the customer's cart, empty if never used.
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(customer_id): Path<String>,
) -> Result<Json<Cart>, ApiError> {
    let customer_id = parse_user_id(&customer_id)?;
    Ok(Json(state.carts.get_cart(customer_id).await?))
}

/// POST /carts/:customer_id/items: add a line item.
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(customer_id): Path<String>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<Cart>, ApiError> {
    let customer_id = parse_user_id(&customer_id)?;
    let merchant_id = parse_user_id(&req.merchant_id)?;
    let item = OrderItem::new(
        req.product_id.as_str(),
        req.product_name.as_str(),
        req.quantity,
        Money::from_cents(req.unit_price_cents),
    )
    .map_err(domain_validation)?;

    Ok(Json(
        state.carts.add_item(customer_id, merchant_id, item).await?,
    ))
}
