//! Domain events, published to NATS when a client is configured.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::order::OrderStatus;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderPlaced { order_id: Uuid, user_id: String, total: Decimal },
    OrderStatusChanged { order_id: Uuid, status: OrderStatus },
    CourierAssigned { order_id: Uuid, courier_id: String },
    PaymentCompleted { order_id: Uuid, payment_id: String },
    StockAdjusted { product_id: Uuid, remaining: u32 },
}

impl DomainEvent {
    /// NATS subject for this event.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::OrderPlaced { .. } => "storefront.orders.placed",
            Self::OrderStatusChanged { .. } => "storefront.orders.status",
            Self::CourierAssigned { .. } => "storefront.orders.courier",
            Self::PaymentCompleted { .. } => "storefront.orders.payment",
            Self::StockAdjusted { .. } => "storefront.stock.adjusted",
        }
    }
}
