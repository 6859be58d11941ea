//! HTTP API server with observability for the delivery coordination system.
//!
//! Provides REST endpoints for carts, orders, driver status and delivery
//! tracking, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use document_store::DocumentStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, LogNotificationGateway, spawn_workers};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: DocumentStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/users", post(routes::users::register::<S>))
        .route("/users/{id}", get(routes::users::get::<S>))
        .route("/drivers/{id}/approve", post(routes::users::approve::<S>))
        .route(
            "/drivers/{id}/availability",
            post(routes::users::set_availability::<S>),
        )
        .route(
            "/drivers/{id}/location",
            post(routes::users::update_location::<S>),
        )
        .route("/carts/{customer_id}", get(routes::carts::get::<S>))
        .route(
            "/carts/{customer_id}/items",
            post(routes::carts::add_item::<S>),
        )
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", post(routes::orders::update_status::<S>))
        .route("/orders/{id}/assign", post(routes::orders::assign::<S>))
        .route("/orders/{id}/delivery", get(routes::deliveries::for_order::<S>))
        .route("/deliveries/{id}", get(routes::deliveries::get::<S>))
        .route(
            "/deliveries/{id}/location",
            post(routes::deliveries::update_location::<S>),
        )
        .route(
            "/deliveries/{id}/status",
            post(routes::deliveries::update_status::<S>),
        )
        .route(
            "/deliveries/{id}/complete",
            post(routes::deliveries::complete::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
