//! Delivery tracking endpoints used by driver devices.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{AggregateId, OperationId};
use document_store::{DocumentStore, Version};
use domain::{
    Aggregate, CompleteDelivery, DeliveryProof, DeliveryTracking, GeoPoint, LocationSample,
    TrackingStatus, UpdateDeliveryStatus, UpdateLocation,
};
use serde::{Deserialize, Serialize};

use super::orders::domain_validation;
use super::{parse_aggregate_id, parse_user_id};
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

/// A position report. `recorded_at` defaults to the time of receipt.
#[derive(Deserialize)]
pub struct LocationRequest {
    pub longitude: f64,
    pub latitude: f64,
    pub accuracy_m: Option<f64>,
    pub heading: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl LocationRequest {
    fn into_sample(self) -> Result<LocationSample, ApiError> {
        let point = GeoPoint::new(self.longitude, self.latitude).map_err(domain_validation)?;
        Ok(LocationSample {
            point,
            accuracy_m: self.accuracy_m,
            heading: self.heading,
            speed_kmh: self.speed_kmh,
            recorded_at: self.recorded_at.unwrap_or_else(Utc::now),
        })
    }
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    #[serde(flatten)]
    pub location: LocationRequest,
    pub operation_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TrackingStatus,
    pub notes: Option<String>,
    pub location: Option<LocationRequest>,
    pub actor_id: Option<String>,
    pub operation_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CompleteRequest {
    #[serde(flatten)]
    pub proof: DeliveryProof,
    pub actor_id: Option<String>,
    pub operation_id: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct LocationResponse {
    pub tracking_id: AggregateId,
    pub status: TrackingStatus,
    pub status_changed: bool,
    pub version: Version,
}

// -- Handlers --

/// GET /deliveries/:id: load a delivery tracking.
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<DeliveryTracking>, ApiError> {
    let tracking_id = parse_aggregate_id(&id)?;
    Ok(Json(state.trackings.get(tracking_id).await?))
}

/// GET /orders/:id/delivery: the tracking opened for an order.
#[tracing::instrument(skip(state))]
pub async fn for_order<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<DeliveryTracking>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    state
        .trackings
        .find_by_order(order_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No delivery for order {id}")))
}

/// POST /deliveries/:id/location: record a position report.
#[tracing::instrument(skip(state, req))]
pub async fn update_location<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateLocationRequest>,
) -> Result<Json<LocationResponse>, ApiError> {
    let tracking_id = parse_aggregate_id(&id)?;
    let sample = req.location.into_sample()?;

    let outcome = state
        .trackings
        .update_location(UpdateLocation::new(
            tracking_id,
            sample,
            operation_id(req.operation_id),
        ))
        .await?;

    Ok(Json(LocationResponse {
        tracking_id,
        status: outcome.tracking.status(),
        status_changed: outcome.status_changed,
        version: outcome.tracking.version(),
    }))
}

/// POST /deliveries/:id/status: move a delivery to a new status.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<DeliveryTracking>, ApiError> {
    let tracking_id = parse_aggregate_id(&id)?;

    let mut cmd =
        UpdateDeliveryStatus::new(tracking_id, req.status, operation_id(req.operation_id));
    if let Some(notes) = req.notes {
        cmd = cmd.with_notes(notes);
    }
    if let Some(location) = req.location {
        cmd = cmd.with_location(location.into_sample()?);
    }
    if let Some(actor) = req.actor_id.as_deref() {
        cmd = cmd.by(parse_user_id(actor)?);
    }

    Ok(Json(state.trackings.update_status(cmd).await?))
}

/// POST /deliveries/:id/complete: attach proof and finish the delivery.
#[tracing::instrument(skip(state, req))]
pub async fn complete<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<DeliveryTracking>, ApiError> {
    let tracking_id = parse_aggregate_id(&id)?;

    let mut cmd = CompleteDelivery::new(tracking_id, req.proof, operation_id(req.operation_id));
    if let Some(actor) = req.actor_id.as_deref() {
        cmd.actor = Some(parse_user_id(actor)?);
    }

    Ok(Json(state.trackings.complete_delivery(cmd).await?))
}

/// The client's operation ID, or a fresh one for clients that send none.
fn operation_id(supplied: Option<String>) -> OperationId {
    supplied
        .filter(|id| !id.trim().is_empty())
        .map(OperationId::new)
        .unwrap_or_else(OperationId::generate)
}
