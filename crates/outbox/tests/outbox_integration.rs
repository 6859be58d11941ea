//! Integration tests: domain services → outbox → stats, notification and
//! real-time handlers.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{AggregateId, UserId};
use document_store::InMemoryDocumentStore;
use domain::{
    Aggregate, CartService, DeliveryAddress, DeliveryInfo, DeliveryTracking, DomainError,
    GeoPoint, Money, Order, OrderItem, OrderService, OrderStatus, PaymentMethod, PlaceOrder,
    TrackingEvent, TrackingPlan, UpdateOrderStatus, User, UserService, Vehicle, VehicleKind,
    assign_delivery_person, tracking::TargetLocation,
};
use outbox::{
    InMemoryNotificationGateway, NotificationHandler, OutboxProcessor, RealtimeHandler,
    RealtimeUpdate, StatsHandler,
};

const PICKUP: GeoPoint = GeoPoint {
    longitude: -69.9312,
    latitude: 18.4861,
};

struct Setup {
    store: InMemoryDocumentStore,
    users: UserService<InMemoryDocumentStore>,
    orders: OrderService<InMemoryDocumentStore>,
    processor: OutboxProcessor<InMemoryDocumentStore>,
    gateway: InMemoryNotificationGateway,
    realtime: RealtimeHandler,
    merchant: UserId,
    customer: UserId,
    driver: UserId,
}

/// Helper to set up services, the processor and all handlers.
async fn setup() -> Setup {
    let store = InMemoryDocumentStore::new();
    let users = UserService::new(store.clone());
    let merchant = users
        .register(User::merchant(
            "Pica Pollo Don Lucas",
            "lucas@example.com",
            "Av. Duarte 80",
            PICKUP,
        ))
        .await
        .unwrap()
        .user_id();
    let customer = UserId::new();
    let driver = users
        .register(User::driver(
            "Rafael",
            "rafael@example.com",
            Vehicle {
                kind: VehicleKind::Motorcycle,
                plate: Some("K123456".into()),
            },
            4.9,
        ))
        .await
        .unwrap()
        .user_id();
    users.approve_driver(driver).await.unwrap();
    users.set_driver_availability(driver, true).await.unwrap();

    let gateway = InMemoryNotificationGateway::new();
    let realtime = RealtimeHandler::new(64);
    let mut processor = OutboxProcessor::new(store.clone());
    processor.register(Arc::new(StatsHandler::new(store.clone())));
    processor.register(Arc::new(NotificationHandler::new(gateway.clone())));
    processor.register(Arc::new(realtime.clone()));

    Setup {
        orders: OrderService::new(store.clone()),
        users,
        store,
        processor,
        gateway,
        realtime,
        merchant,
        customer,
        driver,
    }
}

fn plan_tracking(
    order: &Order,
    merchant: &User,
    driver: &User,
) -> Result<(DeliveryTracking, Vec<TrackingEvent>), DomainError> {
    let now = Utc::now();
    let pickup = merchant
        .as_merchant()
        .map(|m| TargetLocation::new(m.location, m.pickup_address.clone()))
        .unwrap_or_else(|| TargetLocation::new(PICKUP, "pickup"));
    let plan = TrackingPlan {
        pickup,
        delivery: TargetLocation::new(order.delivery().location, "drop-off"),
        start: None,
        estimated_pickup_time: now + Duration::minutes(10),
        estimated_delivery_time: order.estimated_delivery_time(),
    };
    Ok(DeliveryTracking::for_assignment(
        AggregateId::new(),
        order,
        driver.user_id(),
        plan,
        now,
    ))
}

async fn deliver_order(setup: &Setup) -> Order {
    CartService::new(setup.store.clone())
        .add_item(
            setup.customer,
            setup.merchant,
            OrderItem::new("SKU-PP", "Pica pollo combo", 2, Money::from_cents(550)).unwrap(),
        )
        .await
        .unwrap();
    let order = setup
        .orders
        .place_order(PlaceOrder::new(
            setup.customer,
            DeliveryInfo {
                address: DeliveryAddress::new("Calle 8 #14", "Santo Domingo Este"),
                location: GeoPoint {
                    longitude: -69.8600,
                    latitude: 18.4900,
                },
                contact_phone: None,
            },
            PaymentMethod::Cash,
        ))
        .await
        .unwrap();

    for status in [
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
    ] {
        setup
            .orders
            .update_status(UpdateOrderStatus::new(order.id(), status))
            .await
            .unwrap();
    }
    assign_delivery_person(&setup.store, order.id(), setup.driver, plan_tracking)
        .await
        .unwrap();
    setup
        .orders
        .update_status(UpdateOrderStatus::new(order.id(), OrderStatus::Delivered))
        .await
        .unwrap()
        .aggregate
}

#[tokio::test]
async fn delivered_order_updates_stats_and_notifies() {
    let setup = setup().await;
    let mut updates = setup.realtime.subscribe();
    let order = deliver_order(&setup).await;

    let processed = setup.processor.process_pending().await.unwrap();
    assert!(processed > 0);

    let merchant = setup.users.get(setup.merchant).await.unwrap();
    let stats = &merchant.as_merchant().unwrap().stats;
    assert_eq!(stats.completed_orders, 1);
    assert_eq!(stats.revenue, order.total());

    let driver = setup.users.get(setup.driver).await.unwrap();
    assert_eq!(driver.as_driver().unwrap().stats.completed_deliveries, 1);

    let to_merchant = setup.gateway.sent_to(setup.merchant).await;
    assert_eq!(to_merchant.len(), 1);
    assert_eq!(to_merchant[0].title, "New order");

    let to_customer = setup.gateway.sent_to(setup.customer).await;
    assert_eq!(to_customer.len(), 5);
    assert!(to_customer.iter().all(|n| n.order_id == order.id()));

    let mut statuses = Vec::new();
    while let Ok(update) = updates.try_recv() {
        if let RealtimeUpdate::OrderStatus { status, .. } = update {
            statuses.push(status);
        }
    }
    assert_eq!(
        statuses,
        vec![
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Assigned,
            OrderStatus::Delivered,
        ]
    );
}

#[tokio::test]
async fn gateway_outage_does_not_block_stats() {
    let setup = setup().await;
    setup.gateway.set_failing(true);
    deliver_order(&setup).await;

    setup.processor.process_pending().await.unwrap();

    assert!(setup.gateway.sent().await.is_empty());
    let merchant = setup.users.get(setup.merchant).await.unwrap();
    assert_eq!(merchant.as_merchant().unwrap().stats.completed_orders, 1);
}

#[tokio::test]
async fn drained_events_are_not_redelivered() {
    let setup = setup().await;
    deliver_order(&setup).await;

    assert!(setup.processor.process_pending().await.unwrap() > 0);
    assert_eq!(setup.processor.process_pending().await.unwrap(), 0);

    let merchant = setup.users.get(setup.merchant).await.unwrap();
    assert_eq!(merchant.as_merchant().unwrap().stats.completed_orders, 1);
}

#[tokio::test]
async fn restarted_processor_does_not_count_stats_twice() {
    let setup = setup().await;
    let order = deliver_order(&setup).await;
    setup.processor.process_pending().await.unwrap();
    let notified = setup.gateway.sent().await.len();

    let mut restarted = OutboxProcessor::new(setup.store.clone());
    restarted.register(Arc::new(StatsHandler::new(setup.store.clone())));
    restarted.register(Arc::new(NotificationHandler::new(setup.gateway.clone())));

    assert_eq!(restarted.process_pending().await.unwrap(), 0);

    let merchant = setup.users.get(setup.merchant).await.unwrap();
    let stats = &merchant.as_merchant().unwrap().stats;
    assert_eq!(stats.completed_orders, 1);
    assert_eq!(stats.revenue, order.total());
    let driver = setup.users.get(setup.driver).await.unwrap();
    assert_eq!(driver.as_driver().unwrap().stats.completed_deliveries, 1);
    assert_eq!(setup.gateway.sent().await.len(), notified);
}
