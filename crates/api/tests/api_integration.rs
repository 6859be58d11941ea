//! Integration tests for the API server.

use std::sync::Arc;
use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use dispatch::{DispatchConfig, RetryQueue};
use document_store::InMemoryDocumentStore;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

type State = Arc<api::AppState<InMemoryDocumentStore>>;

/// The queue must outlive the test or deferred assignments fail to schedule.
fn setup() -> (axum::Router, State, RetryQueue) {
    let (state, queue) =
        api::AppState::new(InMemoryDocumentStore::new(), DispatchConfig::default());
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state, queue)
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

async fn register_customer(app: &axum::Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/users",
        Some(json!({"role": "customer", "name": "Ana", "email": "ana@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    id_of(&body)
}

async fn register_merchant(app: &axum::Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/users",
        Some(json!({
            "role": "merchant",
            "business_name": "Corner Deli",
            "email": "deli@example.com",
            "pickup_address": "350 5th Ave, New York",
            "longitude": -73.9857,
            "latitude": 40.7484
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["profile"]["role"], "merchant");
    id_of(&body)
}

/// Registers a driver, approves them, places them near the merchant and
/// brings them online.
async fn online_driver(app: &axum::Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/users",
        Some(json!({
            "role": "driver",
            "name": "Bo",
            "email": "bo@example.com",
            "vehicle": {"kind": "motorcycle", "plate": "XYZ-123"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let driver_id = id_of(&body);

    let (status, _) = send(app, "POST", &format!("/drivers/{driver_id}/approve"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        app,
        "POST",
        &format!("/drivers/{driver_id}/location"),
        Some(json!({"longitude": -73.9880, "latitude": 40.7500})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        app,
        "POST",
        &format!("/drivers/{driver_id}/availability"),
        Some(json!({"available": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["driver"]["profile"]["available"], true);
    driver_id
}

/// Fills the customer's cart and places the order. Returns the order JSON.
async fn place_order(app: &axum::Router, customer_id: &str, merchant_id: &str) -> Value {
    let (status, cart) = send(
        app,
        "POST",
        &format!("/carts/{customer_id}/items"),
        Some(json!({
            "merchant_id": merchant_id,
            "product_id": "sku-1",
            "product_name": "Pastrami on rye",
            "quantity": 2,
            "unit_price_cents": 1250
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);

    let (status, order) = send(
        app,
        "POST",
        "/orders",
        Some(json!({
            "customer_id": customer_id,
            "delivery": {
                "street": "1 Main St",
                "city": "New York",
                "longitude": -73.9700,
                "latitude": 40.7600
            },
            "payment_method": "card"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    order
}

async fn walk_to_ready(app: &axum::Router, order_id: &str) {
    for next in ["confirmed", "preparing", "ready"] {
        let (status, body) = send(
            app,
            "POST",
            &format!("/orders/{order_id}/status"),
            Some(json!({"status": next})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], next);
    }
}

#[tokio::test]
async fn test_health_check() {
    let (app, _state, _queue) = setup();

    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_place_order_empties_cart() {
    let (app, _state, _queue) = setup();
    let customer = register_customer(&app).await;
    let merchant = register_merchant(&app).await;

    let order = place_order(&app, &customer, &merchant).await;
    assert_eq!(order["status"], "pending");
    assert_eq!(order["merchant_id"], merchant.as_str());
    assert!(order["driver_id"].is_null());
    assert!(order["order_number"].as_str().unwrap().starts_with("ORD-"));

    let (status, cart) = send(&app, "GET", &format!("/carts/{customer}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cart["items"].as_array().unwrap().is_empty());

    let (status, loaded) = send(&app, "GET", &format!("/orders/{}", id_of(&order)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded["id"], order["id"]);
}

#[tokio::test]
async fn test_place_order_with_empty_cart_is_bad_request() {
    let (app, _state, _queue) = setup();
    let customer = register_customer(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/orders",
        Some(json!({
            "customer_id": customer,
            "delivery": {"street": "1 Main St", "city": "New York", "longitude": -73.97, "latitude": 40.76},
            "payment_method": "cash"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_order_status_walk_and_invalid_transition() {
    let (app, _state, _queue) = setup();
    let customer = register_customer(&app).await;
    let merchant = register_merchant(&app).await;
    let order_id = id_of(&place_order(&app, &customer, &merchant).await);

    walk_to_ready(&app, &order_id).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/orders/{order_id}/status"),
        Some(json!({"status": "delivered"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("transition"));

    let (_, order) = send(&app, "GET", &format!("/orders/{order_id}"), None).await;
    assert_eq!(order["status"], "ready");
    assert_eq!(order["status_history"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_stale_expected_version_is_retryable_conflict() {
    let (app, _state, _queue) = setup();
    let customer = register_customer(&app).await;
    let merchant = register_merchant(&app).await;
    let order = place_order(&app, &customer, &merchant).await;
    let order_id = id_of(&order);
    let seen = order["version"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/orders/{order_id}/status"),
        Some(json!({"status": "confirmed", "expected_version": seen})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/orders/{order_id}/status"),
        Some(json!({"status": "cancelled", "expected_version": seen})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["retry"], true);

    let (_, order) = send(&app, "GET", &format!("/orders/{order_id}"), None).await;
    assert_eq!(order["status"], "confirmed");
}

#[tokio::test]
async fn test_assign_and_track_delivery() {
    let (app, _state, _queue) = setup();
    let customer = register_customer(&app).await;
    let merchant = register_merchant(&app).await;
    let driver = online_driver(&app).await;
    let order_id = id_of(&place_order(&app, &customer, &merchant).await);
    walk_to_ready(&app, &order_id).await;

    let (status, outcome) = send(&app, "POST", &format!("/orders/{order_id}/assign"), None).await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["outcome"], "assigned");
    assert_eq!(outcome["driver_id"], driver.as_str());

    let (status, again) = send(&app, "POST", &format!("/orders/{order_id}/assign"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["outcome"], "already_assigned");

    let (_, order) = send(&app, "GET", &format!("/orders/{order_id}"), None).await;
    assert_eq!(order["status"], "assigned");
    assert_eq!(order["driver_id"], driver.as_str());

    let (status, tracking) = send(&app, "GET", &format!("/orders/{order_id}/delivery"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tracking["id"], outcome["tracking_id"]);
    assert_eq!(tracking["status"], "assigned");
    assert_eq!(tracking["is_live"], true);
    let tracking_id = id_of(&tracking);

    // Still far from the dropoff, so completing is refused.
    let (status, _) = send(
        &app,
        "POST",
        &format!("/deliveries/{tracking_id}/complete"),
        Some(json!({"notes": "left at door"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // A report inside the pickup geofence moves the delivery to at_pickup.
    let (status, moved) = send(
        &app,
        "POST",
        &format!("/deliveries/{tracking_id}/location"),
        Some(json!({"longitude": -73.9857, "latitude": 40.7485, "speed_kmh": 12.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{moved}");
    assert_eq!(moved["status"], "at_pickup");
    assert_eq!(moved["status_changed"], true);

    let (_, tracking) = send(&app, "GET", &format!("/deliveries/{tracking_id}"), None).await;
    assert_eq!(tracking["route"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_assign_without_drivers_is_deferred() {
    let (app, state, _queue) = setup();
    let customer = register_customer(&app).await;
    let merchant = register_merchant(&app).await;
    let order_id = id_of(&place_order(&app, &customer, &merchant).await);
    walk_to_ready(&app, &order_id).await;

    let (status, outcome) = send(&app, "POST", &format!("/orders/{order_id}/assign"), None).await;

    assert_eq!(status, StatusCode::ACCEPTED, "{outcome}");
    assert_eq!(outcome["outcome"], "deferred");
    assert_eq!(
        outcome["retry_in"].as_u64().unwrap(),
        state.assignments.config().retry_delay.as_secs()
    );
}

#[tokio::test]
async fn test_driver_coming_online_takes_waiting_order() {
    let (app, _state, _queue) = setup();
    let customer = register_customer(&app).await;
    let merchant = register_merchant(&app).await;
    let order_id = id_of(&place_order(&app, &customer, &merchant).await);
    walk_to_ready(&app, &order_id).await;

    let (status, _) = send(&app, "POST", &format!("/orders/{order_id}/assign"), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let driver = online_driver(&app).await;

    let (_, order) = send(&app, "GET", &format!("/orders/{order_id}"), None).await;
    assert_eq!(order["status"], "assigned");
    assert_eq!(order["driver_id"], driver.as_str());
}

#[tokio::test]
async fn test_assign_pending_order_is_conflict() {
    let (app, _state, _queue) = setup();
    let customer = register_customer(&app).await;
    let merchant = register_merchant(&app).await;
    let order_id = id_of(&place_order(&app, &customer, &merchant).await);

    let (status, outcome) = send(&app, "POST", &format!("/orders/{order_id}/assign"), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(outcome["outcome"], "not_ready");
    assert_eq!(outcome["status"], "pending");
}

#[tokio::test]
async fn test_bad_and_unknown_ids() {
    let (app, _state, _queue) = setup();

    let (status, body) = send(&app, "GET", "/orders/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let unknown = "00000000-0000-0000-0000-000000000001";
    let (status, _) = send(&app, "GET", &format!("/orders/{unknown}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", &format!("/deliveries/{unknown}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_rejects_out_of_range_coordinates() {
    let (app, _state, _queue) = setup();

    let (status, _) = send(
        &app,
        "POST",
        "/users",
        Some(json!({
            "role": "merchant",
            "business_name": "Nowhere",
            "email": "x@example.com",
            "pickup_address": "?",
            "longitude": 200.0,
            "latitude": 0.0
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _state, _queue) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}
