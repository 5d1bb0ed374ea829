//! Repository layer.
//!
//! Owns all persistent state behind one async trait, injected into the
//! service layer. Two implementations: [`postgres::PgStore`] for production
//! and [`memory::MemoryStore`] for tests and DATABASE_URL-less runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::aggregates::order::Order;
use crate::domain::aggregates::product::Product;
use crate::domain::coupon::Coupon;
use crate::Result;

/// Stock level after an order was accepted, for event publication.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StockLevel {
    pub product_id: Uuid,
    pub remaining: u32,
}

#[async_trait]
pub trait Store: Send + Sync {
    // products
    async fn list_products(&self) -> Result<Vec<Product>>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn insert_product(&self, product: Product) -> Result<Product>;
    async fn update_product(&self, product: Product) -> Result<Product>;
    async fn delete_product(&self, id: Uuid) -> Result<()>;

    // coupons
    async fn list_coupons(&self) -> Result<Vec<Coupon>>;
    /// Case-insensitive lookup by code.
    async fn find_coupon(&self, code: &str) -> Result<Option<Coupon>>;
    async fn insert_coupon(&self, coupon: Coupon) -> Result<Coupon>;
    async fn update_coupon(&self, code: &str, coupon: Coupon) -> Result<Coupon>;
    async fn delete_coupon(&self, code: &str) -> Result<()>;

    // orders
    async fn list_orders(&self) -> Result<Vec<Order>>;
    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;

    /// Accepts an order atomically: re-checks the applied coupon against
    /// current state, verifies and decrements tracked stock, and inserts the
    /// order, all or nothing, so two concurrent orders can never oversell
    /// the last unit. Returns the new stock levels of the tracked products.
    async fn place_order(&self, order: Order) -> Result<(Order, Vec<StockLevel>)>;

    /// Persists a mutated order aggregate. `NotFound` if the id is unknown.
    async fn update_order(&self, order: Order) -> Result<Order>;
}
