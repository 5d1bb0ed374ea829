//! End-to-end tests over the in-memory store: checkout, coupons, lifecycle,
//! tracking and invoices.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use storefront::domain::aggregates::cart::CartItem;
use storefront::domain::aggregates::order::{OrderStatus, ShippingDetails, TrackingInfo};
use storefront::domain::aggregates::product::Product;
use storefront::domain::coupon::{Coupon, CouponError, Discount};
use storefront::domain::value_objects::Money;
use storefront::external::{
    ExternalServiceError, LogNotifier, SimulatedGateway, TrackingProvider,
};
use storefront::invoice::render_invoice;
use storefront::service::{EventBus, OrderService};
use storefront::store::memory::MemoryStore;
use storefront::store::Store;
use storefront::Error;

struct FixedTracking;

#[async_trait]
impl TrackingProvider for FixedTracking {
    async fn tracking_status(&self, _courier_id: &str) -> Result<TrackingInfo, ExternalServiceError> {
        Ok(TrackingInfo {
            current_status: "in_transit".into(),
            location: "Mumbai".into(),
            updated_at: Utc::now(),
            history: vec![],
        })
    }
}

fn shipping() -> ShippingDetails {
    ShippingDetails {
        name: "Demo User".into(),
        address: "123 Main St".into(),
        city: "Anytown".into(),
        state: "CA".into(),
        zip_code: "12345".into(),
        phone: "555-123-4567".into(),
    }
}

async fn setup() -> (Arc<MemoryStore>, OrderService) {
    let store = Arc::new(MemoryStore::new());
    let service = OrderService::new(
        store.clone(),
        Arc::new(LogNotifier),
        Arc::new(FixedTracking),
        Arc::new(SimulatedGateway),
        EventBus::default(),
    );
    (store, service)
}

async fn seed_product(store: &MemoryStore, price: i64, stock: Option<u32>) -> Product {
    let mut product = Product::new(
        format!("SKU-{}", price),
        format!("Item at {}", price),
        Money::inr(Decimal::new(price, 0)),
    );
    if let Some(units) = stock {
        product = product.with_stock(units);
    }
    store.insert_product(product).await.unwrap()
}

fn cart(product: &Product, quantity: u32) -> Vec<CartItem> {
    vec![CartItem {
        product_id: product.id,
        name: product.name.clone(),
        sku: product.sku.clone(),
        quantity,
        unit_price: product.price.clone(),
    }]
}

fn welcome20() -> Coupon {
    Coupon {
        code: "WELCOME20".into(),
        discount: Discount::Percentage(Decimal::new(20, 0)),
        expires_at: Utc::now() + Duration::days(30),
        minimum_amount: Some(Money::inr(Decimal::new(1000, 0))),
        is_active: true,
    }
}

#[tokio::test]
async fn order_without_coupon_totals_subtotal_plus_tax() {
    let (store, service) = setup().await;
    let product = seed_product(&store, 9999, None).await;

    let order = service
        .create_order("user-1", "demo@example.com", cart(&product, 2), shipping(), None)
        .await
        .unwrap();

    assert_eq!(order.subtotal.amount(), Decimal::new(1999800, 2));
    assert_eq!(order.tax.amount(), Decimal::new(99990, 2)); // 999.90
    assert_eq!(order.total.amount(), Decimal::new(2099790, 2)); // 20997.90
}

#[tokio::test]
async fn welcome20_scenario_totals_840() {
    let (store, service) = setup().await;
    let product = seed_product(&store, 1000, None).await;
    store.insert_coupon(welcome20()).await.unwrap();

    let order = service
        .create_order(
            "user-1",
            "demo@example.com",
            cart(&product, 1),
            shipping(),
            Some("WELCOME20"),
        )
        .await
        .unwrap();

    assert_eq!(order.discount.amount(), Decimal::new(20000, 2));
    assert_eq!(order.tax.amount(), Decimal::new(4000, 2));
    assert_eq!(order.total.amount(), Decimal::new(84000, 2));
    assert_eq!(order.coupon.as_ref().unwrap().code, "WELCOME20");
}

#[tokio::test]
async fn below_minimum_coupon_rejects_order_creation() {
    let (store, service) = setup().await;
    let product = seed_product(&store, 400, None).await;
    store.insert_coupon(welcome20()).await.unwrap();

    let err = service
        .create_order(
            "user-1",
            "demo@example.com",
            cart(&product, 1),
            shipping(),
            Some("WELCOME20"),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Coupon(CouponError::BelowMinimum { .. })
    ));
    assert!(store.list_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_coupon_rejects_order_creation() {
    let (store, service) = setup().await;
    let product = seed_product(&store, 5000, None).await;
    let mut expired = welcome20();
    expired.code = "EXPIRED".into();
    expired.expires_at = Utc::now() - Duration::days(5);
    store.insert_coupon(expired).await.unwrap();

    let err = service
        .create_order(
            "user-1",
            "demo@example.com",
            cart(&product, 1),
            shipping(),
            Some("EXPIRED"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Coupon(CouponError::Expired)));
}

#[tokio::test]
async fn insufficient_stock_fails_without_mutation() {
    let (store, service) = setup().await;
    let product = seed_product(&store, 100, Some(3)).await;

    let err = service
        .create_order("user-1", "demo@example.com", cart(&product, 5), shipping(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientStock { available: 3, requested: 5, .. }
    ));
    let current = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(current.available(), Some(3));
}

#[tokio::test]
async fn coupon_edits_never_affect_placed_orders() {
    let (store, service) = setup().await;
    let product = seed_product(&store, 2000, None).await;
    store.insert_coupon(welcome20()).await.unwrap();

    let order = service
        .create_order(
            "user-1",
            "demo@example.com",
            cart(&product, 1),
            shipping(),
            Some("WELCOME20"),
        )
        .await
        .unwrap();

    store.delete_coupon("WELCOME20").await.unwrap();

    let reloaded = service.get_order(order.id).await.unwrap();
    assert_eq!(reloaded.coupon.as_ref().unwrap().code, "WELCOME20");
    assert_eq!(reloaded.total, order.total);
}

#[tokio::test]
async fn full_lifecycle_to_delivery_with_tracking_and_invoice() {
    let (store, service) = setup().await;
    let product = seed_product(&store, 2999, Some(10)).await;

    let order = service
        .create_order("user-7", "user7@example.com", cart(&product, 1), shipping(), None)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Placed);

    service.update_status(order.id, OrderStatus::Packed).await.unwrap();
    service.update_courier(order.id, "IN4325678901").await.unwrap();
    service.update_status(order.id, OrderStatus::Shipped).await.unwrap();

    let tracking = service.refresh_tracking(order.id).await.unwrap().unwrap();
    assert_eq!(tracking.current_status, "in_transit");
    let stored = service.get_order(order.id).await.unwrap();
    assert_eq!(stored.tracking.unwrap().location, "Mumbai");

    let paid = service.charge(order.id, "card").await.unwrap();
    assert!(paid.payment.is_some());

    service
        .update_status(order.id, OrderStatus::OutForDelivery)
        .await
        .unwrap();
    let done = service
        .update_status(order.id, OrderStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(done.status, OrderStatus::Delivered);

    // Cancelled is unreachable from a terminal state.
    let err = service
        .update_status(order.id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    let invoice = String::from_utf8(render_invoice(&done)).unwrap();
    assert!(invoice.contains(&done.order_number));
    assert!(invoice.contains("TOTAL:"));
}

#[tokio::test]
async fn unknown_order_id_is_not_found_everywhere() {
    let (_, service) = setup().await;
    let missing = Uuid::new_v4();
    assert!(matches!(service.get_order(missing).await.unwrap_err(), Error::NotFound(_)));
    assert!(matches!(
        service.update_courier(missing, "X").await.unwrap_err(),
        Error::NotFound(_)
    ));
    assert!(matches!(
        service.refresh_tracking(missing).await.unwrap_err(),
        Error::NotFound(_)
    ));
}
