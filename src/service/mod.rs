//! Order service: the command-handler layer between HTTP and the domain.
//!
//! Pure computation (pricing, coupon validation, status transitions) lives
//! in `domain`; this layer sequences it with persistence and the external
//! collaborators. Notification and tracking failures are logged and
//! swallowed; payment failures propagate.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::aggregates::cart::CartItem;
use crate::domain::aggregates::order::{
    Order, OrderStatus, PaymentInfo, PaymentStatus, ShippingDetails, TrackingInfo,
};
use crate::domain::coupon::{Coupon, CouponSnapshot};
use crate::domain::events::DomainEvent;
use crate::domain::pricing::{self, Pricing};
use crate::domain::value_objects::Money;
use crate::external::{ChargeStatus, Notifier, PaymentGateway, TrackingProvider};
use crate::store::Store;
use crate::{Error, Result};

/// Publishes domain events to NATS when a client is configured, otherwise
/// drops them. Always fire-and-forget.
#[derive(Clone, Default)]
pub struct EventBus {
    nats: Option<async_nats::Client>,
}

impl EventBus {
    pub fn new(nats: Option<async_nats::Client>) -> Self {
        Self { nats }
    }

    pub fn publish(&self, event: DomainEvent) {
        let Some(client) = self.nats.clone() else {
            return;
        };
        tokio::spawn(async move {
            let subject = event.subject();
            let payload = match serde_json::to_vec(&event) {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(subject, %err, "failed to encode event");
                    return;
                }
            };
            if let Err(err) = client.publish(subject, payload.into()).await {
                tracing::warn!(subject, %err, "failed to publish event");
            }
        });
    }
}

const CHARGE_ATTEMPTS: u32 = 3;

pub struct OrderService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    tracking: Arc<dyn TrackingProvider>,
    gateway: Arc<dyn PaymentGateway>,
    events: EventBus,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        tracking: Arc<dyn TrackingProvider>,
        gateway: Arc<dyn PaymentGateway>,
        events: EventBus,
    ) -> Self {
        Self { store, notifier, tracking, gateway, events }
    }

    /// Looks the coupon up and checks it against the live subtotal. Preview
    /// and order creation share this, so the two paths cannot drift.
    async fn resolve_coupon(&self, code: &str, subtotal: &Money) -> Result<Coupon> {
        let coupon = self
            .store
            .find_coupon(code)
            .await?
            .ok_or(Error::Coupon(crate::domain::coupon::CouponError::NotFound))?;
        coupon.check(subtotal, Utc::now())?;
        Ok(coupon)
    }

    /// Prices a cart with an optional coupon, for the checkout preview.
    /// Same engine, same validation as order creation.
    pub async fn preview(&self, items: &[CartItem], coupon_code: Option<&str>) -> Result<Pricing> {
        let base = pricing::price(items, None)?;
        let coupon = match coupon_code {
            Some(code) => Some(self.resolve_coupon(code, &base.subtotal).await?),
            None => None,
        };
        Ok(pricing::price(items, coupon.as_ref())?)
    }

    /// Creates an order: validates the coupon against the live subtotal,
    /// prices the items, and commits order + stock decrement atomically.
    /// A coupon that fails validation rejects the order; it is never
    /// silently ignored. The confirmation email is fire-and-forget.
    pub async fn create_order(
        &self,
        user_id: &str,
        user_email: &str,
        items: Vec<CartItem>,
        shipping: ShippingDetails,
        coupon_code: Option<&str>,
    ) -> Result<Order> {
        let base = pricing::price(&items, None)?;
        let coupon = match coupon_code {
            Some(code) => Some(self.resolve_coupon(code, &base.subtotal).await?),
            None => None,
        };

        let priced = pricing::price(&items, coupon.as_ref())?;
        let snapshot = coupon.as_ref().map(CouponSnapshot::from);
        let order = Order::create(user_id, user_email, &items, shipping, snapshot, &priced);

        let (order, stock_levels) = self.store.place_order(order).await?;

        self.events.publish(DomainEvent::OrderPlaced {
            order_id: order.id,
            user_id: order.user_id.clone(),
            total: order.total.amount(),
        });
        for level in stock_levels {
            self.events.publish(DomainEvent::StockAdjusted {
                product_id: level.product_id,
                remaining: level.remaining,
            });
        }

        let notifier = self.notifier.clone();
        let confirmation = order.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier
                .send_order_confirmation(&confirmation, &confirmation.user_email)
                .await
            {
                tracing::warn!(order_id = %confirmation.id, %err, "order confirmation failed");
            }
        });

        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(Error::NotFound("order"))
    }

    pub async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<Order> {
        let mut order = self.get_order(order_id).await?;
        order.transition(status)?;
        let order = self.store.update_order(order).await?;

        self.events
            .publish(DomainEvent::OrderStatusChanged { order_id, status });

        let notifier = self.notifier.clone();
        let email = order.user_email.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.send_status_update(order_id, status, &email).await {
                tracing::warn!(%order_id, %err, "status update notification failed");
            }
        });

        Ok(order)
    }

    pub async fn update_courier(&self, order_id: Uuid, courier_id: &str) -> Result<Order> {
        let mut order = self.get_order(order_id).await?;
        order.assign_courier(courier_id);
        let order = self.store.update_order(order).await?;
        self.events.publish(DomainEvent::CourierAssigned {
            order_id,
            courier_id: courier_id.to_string(),
        });
        Ok(order)
    }

    /// Attaches externally completed payment details to the order.
    pub async fn complete_payment(
        &self,
        order_id: Uuid,
        payment_id: String,
        payment_method: String,
        payment_status: PaymentStatus,
    ) -> Result<Order> {
        let mut order = self.get_order(order_id).await?;
        let amount = order.total.clone();
        order.attach_payment(PaymentInfo {
            payment_id: payment_id.clone(),
            payment_status,
            payment_method,
            amount,
            timestamp: Utc::now(),
        });
        let order = self.store.update_order(order).await?;
        if payment_status == PaymentStatus::Completed {
            self.events
                .publish(DomainEvent::PaymentCompleted { order_id, payment_id });
        }
        Ok(order)
    }

    /// Charges the order total through the gateway with bounded retries.
    /// The idempotency key is the order id, so retries can never double
    /// charge. On exhaustion or decline the order keeps its pending payment
    /// state; it is never silently marked paid.
    pub async fn charge(&self, order_id: Uuid, payment_method: &str) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        let key = order.id.to_string();

        let mut last_err = None;
        for attempt in 0..CHARGE_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt - 1))).await;
            }
            match self
                .gateway
                .charge(&order.total, &order.user_email, &key)
                .await
            {
                Ok(outcome) if outcome.status == ChargeStatus::Completed => {
                    return self
                        .complete_payment(
                            order_id,
                            outcome.payment_id,
                            payment_method.to_string(),
                            PaymentStatus::Completed,
                        )
                        .await;
                }
                Ok(outcome) => {
                    // Declines are final, not transient.
                    self.complete_payment(
                        order_id,
                        outcome.payment_id,
                        payment_method.to_string(),
                        PaymentStatus::Failed,
                    )
                    .await?;
                    return Err(Error::Payment("charge declined".into()));
                }
                Err(err) => {
                    tracing::warn!(%order_id, attempt, %err, "charge attempt failed");
                    last_err = Some(err);
                }
            }
        }
        Err(Error::Payment(
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "gateway unavailable".into()),
        ))
    }

    /// Polls the courier for tracking. `None` when no courier is assigned
    /// or the provider errors; a tracking outage never fails the caller.
    pub async fn refresh_tracking(&self, order_id: Uuid) -> Result<Option<TrackingInfo>> {
        let mut order = self.get_order(order_id).await?;
        let Some(courier_id) = order.courier_id.clone() else {
            return Ok(None);
        };
        match self.tracking.tracking_status(&courier_id).await {
            Ok(info) => {
                order.record_tracking(info.clone());
                self.store.update_order(order).await?;
                Ok(Some(info))
            }
            Err(err) => {
                tracing::warn!(%order_id, courier_id, %err, "tracking refresh failed");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::coupon::{CouponError, Discount};
    use crate::domain::value_objects::Money;
    use crate::external::{ChargeOutcome, ExternalServiceError};
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingTracking;

    #[async_trait]
    impl TrackingProvider for FailingTracking {
        async fn tracking_status(
            &self,
            _courier_id: &str,
        ) -> std::result::Result<TrackingInfo, ExternalServiceError> {
            Err(ExternalServiceError("courier API down".into()))
        }
    }

    /// Fails `failures` times, then completes.
    struct FlakyGateway {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PaymentGateway for FlakyGateway {
        async fn charge(
            &self,
            _amount: &Money,
            _customer: &str,
            idempotency_key: &str,
        ) -> std::result::Result<ChargeOutcome, ExternalServiceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(ExternalServiceError("timeout".into()));
            }
            Ok(ChargeOutcome {
                payment_id: format!("pay_{idempotency_key}"),
                status: ChargeStatus::Completed,
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

    fn service_with(store: Arc<MemoryStore>, gateway: Arc<dyn PaymentGateway>) -> OrderService {
        OrderService::new(
            store,
            Arc::new(crate::external::LogNotifier),
            Arc::new(FailingTracking),
            gateway,
            EventBus::default(),
        )
    }

    async fn cart_from_demo(store: &MemoryStore, name: &str, quantity: u32) -> Vec<CartItem> {
        let product = store
            .list_products()
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.name == name)
            .unwrap();
        vec![CartItem {
            product_id: product.id,
            name: product.name.clone(),
            sku: product.sku.clone(),
            quantity,
            unit_price: product.price.clone(),
        }]
    }

    #[tokio::test]
    async fn create_order_prices_and_snapshots() {
        let store = Arc::new(MemoryStore::with_demo_data());
        let service = service_with(store.clone(), Arc::new(crate::external::SimulatedGateway));

        let items = cart_from_demo(&store, "Wireless Headphones", 1).await;
        let order = service
            .create_order("user-1", "demo@example.com", items, shipping(), Some("WELCOME20"))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Placed);
        assert_eq!(order.subtotal.amount(), Decimal::new(299900, 2));
        // 20% off 2999 = 599.80, taxable 2399.20, 5% tax 119.96, total 2519.16
        assert_eq!(order.discount.amount(), Decimal::new(59980, 2));
        assert_eq!(order.tax.amount(), Decimal::new(11996, 2));
        assert_eq!(order.total.amount(), Decimal::new(251916, 2));
        assert_eq!(order.coupon.as_ref().unwrap().code, "WELCOME20");
    }

    #[tokio::test]
    async fn coupon_below_minimum_rejects_the_order() {
        let store = Arc::new(MemoryStore::with_demo_data());
        let service = service_with(store.clone(), Arc::new(crate::external::SimulatedGateway));

        // USB-C Cable at 299 is below WELCOME20's 1000 minimum.
        let items = cart_from_demo(&store, "USB-C Cable", 1).await;
        let err = service
            .create_order("user-1", "demo@example.com", items, shipping(), Some("WELCOME20"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Coupon(CouponError::BelowMinimum { .. })));
        assert!(store.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn foreign_currency_flat_coupon_rejects_the_order() {
        let store = Arc::new(MemoryStore::with_demo_data());
        let service = service_with(store.clone(), Arc::new(crate::external::SimulatedGateway));
        store
            .insert_coupon(crate::domain::coupon::Coupon {
                code: "FLAT-USD".into(),
                discount: Discount::Flat(Money::new(Decimal::new(100, 0), "USD")),
                expires_at: Utc::now() + chrono::Duration::days(7),
                minimum_amount: None,
                is_active: true,
            })
            .await
            .unwrap();

        let items = cart_from_demo(&store, "Wireless Headphones", 1).await;
        let err = service
            .create_order("user-1", "demo@example.com", items, shipping(), Some("FLAT-USD"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_cart_is_rejected() {
        let store = Arc::new(MemoryStore::with_demo_data());
        let service = service_with(store.clone(), Arc::new(crate::external::SimulatedGateway));
        let err = service
            .create_order("user-1", "demo@example.com", vec![], shipping(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyOrder));
    }

    #[tokio::test]
    async fn insufficient_stock_rejects_and_preserves_stock() {
        let store = Arc::new(MemoryStore::with_demo_data());
        let service = service_with(store.clone(), Arc::new(crate::external::SimulatedGateway));

        // Smart Watch has 15 units.
        let items = cart_from_demo(&store, "Smart Watch", 20).await;
        let product_id = items[0].product_id;
        let err = service
            .create_order("user-1", "demo@example.com", items, shipping(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientStock { available: 15, requested: 20, .. }
        ));
        let product = store.get_product(product_id).await.unwrap().unwrap();
        assert_eq!(product.available(), Some(15));
    }

    #[tokio::test]
    async fn status_updates_enforce_the_state_machine() {
        let store = Arc::new(MemoryStore::with_demo_data());
        let service = service_with(store.clone(), Arc::new(crate::external::SimulatedGateway));

        let items = cart_from_demo(&store, "Bluetooth Speaker", 1).await;
        let order = service
            .create_order("user-1", "demo@example.com", items, shipping(), None)
            .await
            .unwrap();

        service.update_status(order.id, OrderStatus::Shipped).await.unwrap();
        let err = service
            .update_status(order.id, OrderStatus::Placed)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let store = Arc::new(MemoryStore::with_demo_data());
        let service = service_with(store, Arc::new(crate::external::SimulatedGateway));
        let err = service
            .update_status(Uuid::new_v4(), OrderStatus::Packed)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound("order")));
    }

    #[tokio::test]
    async fn tracking_refresh_without_courier_is_none() {
        let store = Arc::new(MemoryStore::with_demo_data());
        let service = service_with(store.clone(), Arc::new(crate::external::SimulatedGateway));
        let items = cart_from_demo(&store, "Bluetooth Speaker", 1).await;
        let order = service
            .create_order("user-1", "demo@example.com", items, shipping(), None)
            .await
            .unwrap();
        assert!(service.refresh_tracking(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tracking_provider_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::with_demo_data());
        let service = service_with(store.clone(), Arc::new(crate::external::SimulatedGateway));
        let items = cart_from_demo(&store, "Bluetooth Speaker", 1).await;
        let order = service
            .create_order("user-1", "demo@example.com", items, shipping(), None)
            .await
            .unwrap();
        service.update_courier(order.id, "IN4325678901").await.unwrap();

        // FailingTracking always errors; the caller still gets Ok(None).
        assert!(service.refresh_tracking(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn charge_retries_transient_failures_then_completes() {
        let store = Arc::new(MemoryStore::with_demo_data());
        let gateway = Arc::new(FlakyGateway { failures: 2, calls: AtomicU32::new(0) });
        let service = service_with(store.clone(), gateway.clone());

        let items = cart_from_demo(&store, "Bluetooth Speaker", 1).await;
        let order = service
            .create_order("user-1", "demo@example.com", items, shipping(), None)
            .await
            .unwrap();

        let paid = service.charge(order.id, "card").await.unwrap();
        let payment = paid.payment.unwrap();
        assert_eq!(payment.payment_status, PaymentStatus::Completed);
        assert_eq!(payment.payment_id, format!("pay_{}", order.id));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn charge_gives_up_after_bounded_attempts() {
        let store = Arc::new(MemoryStore::with_demo_data());
        let gateway = Arc::new(FlakyGateway { failures: 10, calls: AtomicU32::new(0) });
        let service = service_with(store.clone(), gateway.clone());

        let items = cart_from_demo(&store, "Bluetooth Speaker", 1).await;
        let order = service
            .create_order("user-1", "demo@example.com", items, shipping(), None)
            .await
            .unwrap();

        let err = service.charge(order.id, "card").await.unwrap_err();
        assert!(matches!(err, Error::Payment(_)));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
        // Order is never silently marked paid.
        let order = service.get_order(order.id).await.unwrap();
        assert!(order.payment.is_none());
    }

    #[tokio::test]
    async fn preview_matches_create_order_totals() {
        let store = Arc::new(MemoryStore::with_demo_data());
        let service = service_with(store.clone(), Arc::new(crate::external::SimulatedGateway));
        let items = cart_from_demo(&store, "Wireless Headphones", 2).await;

        let preview = service.preview(&items, Some("SAVE10")).await.unwrap();
        let order = service
            .create_order("user-1", "demo@example.com", items, shipping(), Some("SAVE10"))
            .await
            .unwrap();
        assert_eq!(preview.rounded().total, order.total);
    }
}
