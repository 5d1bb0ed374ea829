//! External collaborators: notification, courier tracking, payment gateway.
//!
//! Only the contracts matter to the core; the bundled implementations are
//! simulators standing in for a real email provider, a courier API and a
//! payment processor. Notification and tracking failures are non-critical
//! (callers log and continue); gateway failures are critical and propagate.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::domain::aggregates::order::{Order, OrderStatus, TrackingEvent, TrackingInfo};
use crate::domain::value_objects::Money;

#[derive(Debug, thiserror::Error)]
#[error("external service error: {0}")]
pub struct ExternalServiceError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_order_confirmation(
        &self,
        order: &Order,
        email: &str,
    ) -> Result<bool, ExternalServiceError>;

    async fn send_status_update(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        email: &str,
    ) -> Result<bool, ExternalServiceError>;
}

#[async_trait]
pub trait TrackingProvider: Send + Sync {
    async fn tracking_status(&self, courier_id: &str) -> Result<TrackingInfo, ExternalServiceError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChargeOutcome {
    pub payment_id: String,
    pub status: ChargeStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChargeStatus {
    Completed,
    Declined,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// `idempotency_key` makes retries safe: a gateway must treat repeated
    /// charges with the same key as one charge.
    async fn charge(
        &self,
        amount: &Money,
        customer: &str,
        idempotency_key: &str,
    ) -> Result<ChargeOutcome, ExternalServiceError>;
}

/// Logs the email instead of sending it.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_confirmation(
        &self,
        order: &Order,
        email: &str,
    ) -> Result<bool, ExternalServiceError> {
        tracing::info!(order_id = %order.id, email, total = %order.total, "order confirmation email");
        Ok(true)
    }

    async fn send_status_update(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        email: &str,
    ) -> Result<bool, ExternalServiceError> {
        tracing::info!(%order_id, %status, email, "order status update email");
        Ok(true)
    }
}

/// Simulated courier API returning a plausible tracking timeline.
pub struct SimulatedTracking;

#[async_trait]
impl TrackingProvider for SimulatedTracking {
    async fn tracking_status(&self, courier_id: &str) -> Result<TrackingInfo, ExternalServiceError> {
        let mut rng = rand::thread_rng();
        let statuses = ["in_transit", "out_for_delivery", "delivered"];
        let locations = ["Mumbai", "Delhi", "Bangalore", "Chennai", "Kolkata"];
        let current = *statuses.choose(&mut rng).unwrap_or(&"in_transit");
        let location = (*locations.choose(&mut rng).unwrap_or(&"Mumbai")).to_string();
        let now = Utc::now();

        let mut history = vec![TrackingEvent {
            status: "pickup_complete".into(),
            location: "Warehouse".into(),
            timestamp: now - Duration::days(3),
        }];
        if current != "delivered" {
            history.push(TrackingEvent {
                status: "in_transit".into(),
                location: (*locations.choose(&mut rng).unwrap_or(&"Delhi")).to_string(),
                timestamp: now - Duration::days(1),
            });
        }
        history.push(TrackingEvent {
            status: current.into(),
            location: location.clone(),
            timestamp: now,
        });

        tracing::debug!(courier_id, current, "simulated tracking lookup");
        Ok(TrackingInfo {
            current_status: current.into(),
            location,
            updated_at: now,
            history,
        })
    }
}

/// Simulated gateway that always completes the charge.
pub struct SimulatedGateway;

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(
        &self,
        amount: &Money,
        customer: &str,
        idempotency_key: &str,
    ) -> Result<ChargeOutcome, ExternalServiceError> {
        tracing::info!(%amount, customer, idempotency_key, "simulated charge");
        Ok(ChargeOutcome {
            payment_id: format!("pay_{:010}", rand::thread_rng().gen_range(0..10_000_000_000u64)),
            status: ChargeStatus::Completed,
        })
    }
}
