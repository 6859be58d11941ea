//! Registration and driver status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use document_store::DocumentStore;
use domain::{GeoPoint, User, Vehicle};
use serde::{Deserialize, Serialize};

use super::orders::domain_validation;
use super::parse_user_id;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RegisterRequest {
    Customer {
        name: String,
        email: String,
        phone: Option<String>,
    },
    Merchant {
        business_name: String,
        email: String,
        phone: Option<String>,
        pickup_address: String,
        longitude: f64,
        latitude: f64,
    },
    Driver {
        name: String,
        email: String,
        phone: Option<String>,
        vehicle: Vehicle,
        #[serde(default = "default_rating")]
        rating: f64,
    },
}

fn default_rating() -> f64 {
    5.0
}

impl RegisterRequest {
    fn into_user(self) -> Result<User, ApiError> {
        let (user, phone) = match self {
            RegisterRequest::Customer { name, email, phone } => (User::customer(name, email), phone),
            RegisterRequest::Merchant {
                business_name,
                email,
                phone,
                pickup_address,
                longitude,
                latitude,
            } => {
                let location = GeoPoint::new(longitude, latitude).map_err(domain_validation)?;
                (
                    User::merchant(business_name, email, pickup_address, location),
                    phone,
                )
            }
            RegisterRequest::Driver {
                name,
                email,
                phone,
                vehicle,
                rating,
            } => (User::driver(name, email, vehicle, rating), phone),
        };
        Ok(match phone {
            Some(phone) => user.with_phone(phone),
            None => user,
        })
    }
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub available: bool,
}

#[derive(Deserialize)]
pub struct DriverLocationRequest {
    pub longitude: f64,
    pub latitude: f64,
}

// -- Response types --

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub driver: User,
    /// Waiting orders the driver was bound to on coming online.
    pub orders_assigned: usize,
}

// -- Handlers --

/// POST /users: register a customer, merchant or driver.
#[tracing::instrument(skip(state, req))]
pub async fn register<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.users.register(req.into_user()?).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /users/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user_id = parse_user_id(&id)?;
    Ok(Json(state.users.get(user_id).await?))
}

/// POST /drivers/:id/approve
#[tracing::instrument(skip(state))]
pub async fn approve<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let driver_id = parse_user_id(&id)?;
    Ok(Json(state.users.approve_driver(driver_id).await?))
}

/// POST /drivers/:id/availability: go online or offline. A driver coming
/// online is offered the waiting orders straight away.
#[tracing::instrument(skip(state, req))]
pub async fn set_availability<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let driver_id = parse_user_id(&id)?;

    let orders_assigned = if req.available {
        state.assignments.release_delivery(driver_id).await?
    } else {
        state.users.set_driver_availability(driver_id, false).await?;
        0
    };

    Ok(Json(AvailabilityResponse {
        driver: state.users.get(driver_id).await?,
        orders_assigned,
    }))
}

/// POST /drivers/:id/location: the driver's position while not delivering.
#[tracing::instrument(skip(state, req))]
pub async fn update_location<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<DriverLocationRequest>,
) -> Result<Json<User>, ApiError> {
    let driver_id = parse_user_id(&id)?;
    let location = GeoPoint::new(req.longitude, req.latitude).map_err(domain_validation)?;
    Ok(Json(
        state
            .users
            .update_driver_location(driver_id, location)
            .await?,
    ))
}
