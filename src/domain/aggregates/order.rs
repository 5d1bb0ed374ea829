//! Order aggregate.
//!
//! Orders snapshot their line items and any applied coupon by value at
//! creation time; the four pricing components are persisted alongside the
//! snapshot so no reader ever recomputes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::aggregates::cart::CartItem;
use crate::domain::coupon::CouponSnapshot;
use crate::domain::pricing::Pricing;
use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Placed,
    Packed,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Position along the fulfilment progression. Terminal states have none.
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Placed => Some(0),
            Self::Packed => Some(1),
            Self::Shipped => Some(2),
            Self::OutForDelivery => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Forward-only progression, with cancellation allowed from any
    /// non-terminal state. Skipping intermediate steps is permitted.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            OrderStatus::Cancelled => true,
            _ => match (self.rank(), to.rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Placed => "placed",
            Self::Packed => "packed",
            Self::Shipped => "shipped",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "placed" => Ok(Self::Placed),
            "packed" => Ok(Self::Packed),
            "shipped" => Ok(Self::Shipped),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub phone: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub payment_id: String,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub status: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub current_status: String,
    pub location: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<TrackingEvent>,
}

/// Snapshot of a cart line at checkout, priced at order time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl From<&CartItem> for OrderItem {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id,
            name: item.name.clone(),
            sku: item.sku.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price.clone(),
            line_total: item.line_total(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: String,
    pub user_email: String,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
    pub status: OrderStatus,
    pub shipping: ShippingDetails,
    pub coupon: Option<CouponSnapshot>,
    pub courier_id: Option<String>,
    pub payment: Option<PaymentInfo>,
    pub tracking: Option<TrackingInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a placed order from a priced set of items. Pricing components
    /// are rounded here, at the persistence boundary.
    pub fn create(
        user_id: impl Into<String>,
        user_email: impl Into<String>,
        items: &[CartItem],
        shipping: ShippingDetails,
        coupon: Option<CouponSnapshot>,
        pricing: &Pricing,
    ) -> Self {
        let now = Utc::now();
        let rounded = pricing.rounded();
        Self {
            id: Uuid::now_v7(),
            order_number: format!("ORD-{:08}", rand::random::<u32>() % 100_000_000),
            user_id: user_id.into(),
            user_email: user_email.into(),
            items: items.iter().map(OrderItem::from).collect(),
            subtotal: rounded.subtotal,
            discount: rounded.discount,
            tax: rounded.tax,
            total: rounded.total,
            status: OrderStatus::Placed,
            shipping,
            coupon,
            courier_id: None,
            payment: None,
            tracking: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, to: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition { from: self.status, to });
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    pub fn assign_courier(&mut self, courier_id: impl Into<String>) {
        self.courier_id = Some(courier_id.into());
        self.touch();
    }

    pub fn attach_payment(&mut self, payment: PaymentInfo) {
        self.payment = Some(payment);
        self.touch();
    }

    pub fn record_tracking(&mut self, tracking: TrackingInfo) {
        self.tracking = Some(tracking);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}
