use chrono::Utc;
use common::{AggregateId, UserId};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use dispatch::{Candidate, DispatchConfig, scoring};
use domain::{
    Cart, DeliveryAddress, DeliveryInfo, GeoPoint, Money, Order, OrderItem, PaymentMethod,
    PricingPolicy, User, Vehicle, VehicleKind,
};

const PICKUP: GeoPoint = GeoPoint {
    longitude: -69.9312,
    latitude: 18.4861,
};

fn candidates(count: usize) -> Vec<Candidate> {
    (0..count)
        .map(|i| {
            let location = GeoPoint {
                longitude: PICKUP.longitude + (i as f64) * 0.001,
                latitude: PICKUP.latitude,
            };
            Candidate {
                driver_id: UserId::new(),
                location,
                distance_m: PICKUP.distance_m(&location),
                rating: 3.0 + (i % 20) as f64 / 10.0,
                active_deliveries: i % 2,
            }
        })
        .collect()
}

fn bench_rank(c: &mut Criterion) {
    let radius = DispatchConfig::default().search_radius_m;
    let mut group = c.benchmark_group("dispatch/rank");
    for size in [10, 100, 1_000] {
        let pool = candidates(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &pool, |b, pool| {
            b.iter(|| scoring::rank(pool.clone(), radius));
        });
    }
    group.finish();
}

fn bench_plan_delivery(c: &mut Criterion) {
    let now = Utc::now();
    let merchant = User::merchant("Colmado", "colmado@example.com", "Calle 1", PICKUP);
    let driver = User::driver(
        "Pedro",
        "pedro@example.com",
        Vehicle {
            kind: VehicleKind::Motorcycle,
            plate: None,
        },
        4.5,
    );
    let mut cart = Cart::new(UserId::new(), now);
    cart.add_item(
        merchant.user_id(),
        OrderItem::new("SKU-1", "Tostones", 2, Money::from_cents(300)).unwrap(),
        now,
    )
    .unwrap();
    let (order, _) = Order::place(
        AggregateId::new(),
        &cart,
        DeliveryInfo {
            address: DeliveryAddress::new("Av. Bolívar 300", "Santo Domingo"),
            location: GeoPoint {
                longitude: -69.9000,
                latitude: 18.4700,
            },
            contact_phone: None,
        },
        PaymentMethod::Cash,
        &PricingPolicy::default(),
        now,
    )
    .unwrap();

    c.bench_function("dispatch/plan_delivery", |b| {
        b.iter(|| dispatch::plan_delivery(&order, &merchant, &driver, 25.0, now));
    });
}

criterion_group!(benches, bench_rank, bench_plan_delivery);
criterion_main!(benches);
