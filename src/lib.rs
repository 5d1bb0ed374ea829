//! Storefront order service.
//!
//! A small e-commerce backend: product catalog, coupons, a single-authority
//! order pricing engine, order lifecycle with courier tracking, payments and
//! invoices. The domain core under [`domain`] is pure; persistence, HTTP and
//! external collaborators live in their own layers.

use thiserror::Error;
use uuid::Uuid;

pub mod api;
pub mod domain;
pub mod external;
pub mod invoice;
pub mod service;
pub mod store;

use domain::aggregates::order::{OrderError, OrderStatus};
use domain::coupon::CouponError;
use domain::pricing::PricingError;

/// Top-level error taxonomy.
///
/// Validation failures surface to the caller and are never retried; missing
/// records map to 404; storage and critical external failures are server
/// errors. Non-critical external failures (notification, tracking refresh)
/// never reach this type; they are logged and swallowed at the call site.
#[derive(Error, Debug)]
pub enum Error {
    #[error("order has no items")]
    EmptyOrder,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error("insufficient stock for product {product_id}: {available} available, {requested} requested")]
    InsufficientStock { product_id: Uuid, available: u32, requested: u32 },

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("payment failed: {0}")]
    Payment(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<PricingError> for Error {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::EmptyOrder => Error::EmptyOrder,
            PricingError::CurrencyMismatch => Error::Validation(err.to_string()),
        }
    }
}

impl From<OrderError> for Error {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { from, to } => Error::InvalidTransition { from, to },
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("record"),
            other => Error::Storage(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
