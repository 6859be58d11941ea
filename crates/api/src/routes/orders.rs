//! Order placement, status and assignment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use dispatch::AssignmentOutcome;
use document_store::{DocumentStore, Version};
use domain::{
    DeliveryAddress, DeliveryInfo, GeoPoint, Order, OrderStatus, PaymentMethod, PlaceOrder,
    UpdateOrderStatus,
};
use serde::Deserialize;

use super::{parse_aggregate_id, parse_user_id};
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub delivery: DeliveryRequest,
    pub payment_method: PaymentMethod,
}

#[derive(Deserialize)]
pub struct DeliveryRequest {
    pub street: String,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub instructions: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    pub contact_phone: Option<String>,
}

impl DeliveryRequest {
    fn into_info(self) -> Result<DeliveryInfo, ApiError> {
        let location = GeoPoint::new(self.longitude, self.latitude).map_err(domain_validation)?;
        Ok(DeliveryInfo {
            address: DeliveryAddress {
                street: self.street,
                city: self.city,
                state: self.state,
                postal_code: self.postal_code,
                instructions: self.instructions,
            },
            location,
            contact_phone: self.contact_phone,
        })
    }
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    pub description: Option<String>,
    pub actor_id: Option<String>,
    /// The version the client last saw; a newer stored version is a conflict.
    pub expected_version: Option<i64>,
}

// -- Handlers --

/// POST /orders: place an order from the customer's cart.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let customer_id = parse_user_id(&req.customer_id)?;
    let delivery = req.delivery.into_info()?;

    let order = state
        .orders
        .place_order(PlaceOrder::new(customer_id, delivery, req.payment_method))
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/:id: load an order by ID.
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(state.orders.get_order(order_id).await?))
}

/// POST /orders/:id/status: move an order along its lifecycle.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;

    let mut cmd = UpdateOrderStatus::new(order_id, req.status);
    if let Some(description) = req.description {
        cmd = cmd.with_description(description);
    }
    if let Some(actor) = req.actor_id.as_deref() {
        cmd = cmd.by(parse_user_id(actor)?);
    }
    if let Some(version) = req.expected_version {
        cmd = cmd.expecting(Version::new(version));
    }

    let result = state.orders.update_status(cmd).await?;
    Ok(Json(result.aggregate))
}

/// POST /orders/:id/assign: find and bind a driver for a ready order.
///
/// A deferred order answers 202; an order that is not ready answers 409.
#[tracing::instrument(skip(state))]
pub async fn assign<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<AssignmentOutcome>), ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    let outcome = state.assignments.assign_delivery_to_order(order_id).await?;

    let status = match outcome {
        AssignmentOutcome::Assigned { .. } | AssignmentOutcome::AlreadyAssigned => StatusCode::OK,
        AssignmentOutcome::Deferred { .. } => StatusCode::ACCEPTED,
        AssignmentOutcome::NotReady { .. } => StatusCode::CONFLICT,
    };
    Ok((status, Json(outcome)))
}

pub(crate) fn domain_validation(err: domain::ValidationError) -> ApiError {
    ApiError::Domain(err.into())
}
