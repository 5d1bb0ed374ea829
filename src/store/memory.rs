//! In-process store.
//!
//! One `RwLock` over all collections; `place_order` holds the write guard
//! across stock check, decrement and insert, which gives the same
//! all-or-nothing guarantee as the Postgres transaction.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::domain::aggregates::order::Order;
use crate::domain::aggregates::product::Product;
use crate::domain::coupon::{Coupon, Discount};
use crate::domain::value_objects::Money;
use crate::store::{StockLevel, Store};
use crate::{Error, Result};

#[derive(Default)]
struct Inner {
    products: HashMap<Uuid, Product>,
    coupons: Vec<Coupon>,
    orders: HashMap<Uuid, Order>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a small catalog and the standard coupon set, for
    /// running without a database.
    pub fn with_demo_data() -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write().expect("lock poisoned");
            let catalog = [
                ("SKU-HDP-001", "Wireless Headphones", 2999, Some(45)),
                ("SKU-SPK-002", "Bluetooth Speaker", 1899, Some(30)),
                ("SKU-WTC-003", "Smart Watch", 9999, Some(15)),
                ("SKU-CBL-004", "USB-C Cable", 299, None),
            ];
            for (sku, name, price, stock) in catalog {
                let mut product = Product::new(sku, name, Money::inr(Decimal::new(price, 0)));
                if let Some(units) = stock {
                    product = product.with_stock(units);
                }
                inner.products.insert(product.id, product);
            }

            let now = Utc::now();
            inner.coupons = vec![
                Coupon {
                    code: "WELCOME20".into(),
                    discount: Discount::Percentage(Decimal::new(20, 0)),
                    expires_at: now + Duration::days(30),
                    minimum_amount: Some(Money::inr(Decimal::new(1000, 0))),
                    is_active: true,
                },
                Coupon {
                    code: "FLAT100".into(),
                    discount: Discount::Flat(Money::inr(Decimal::new(100, 0))),
                    expires_at: now + Duration::days(15),
                    minimum_amount: Some(Money::inr(Decimal::new(500, 0))),
                    is_active: true,
                },
                Coupon {
                    code: "SAVE10".into(),
                    discount: Discount::Percentage(Decimal::new(10, 0)),
                    expires_at: now + Duration::days(15),
                    minimum_amount: None,
                    is_active: true,
                },
                Coupon {
                    code: "NEWUSER50".into(),
                    discount: Discount::Flat(Money::inr(Decimal::new(50, 0))),
                    expires_at: now + Duration::days(45),
                    minimum_amount: Some(Money::inr(Decimal::new(300, 0))),
                    is_active: true,
                },
            ];
        }
        store
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("lock poisoned")
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_products(&self) -> Result<Vec<Product>> {
        let mut products: Vec<_> = self.read().products.values().cloned().collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.read().products.get(&id).cloned())
    }

    async fn insert_product(&self, product: Product) -> Result<Product> {
        self.write().products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, product: Product) -> Result<Product> {
        let mut inner = self.write();
        if !inner.products.contains_key(&product.id) {
            return Err(Error::NotFound("product"));
        }
        inner.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn delete_product(&self, id: Uuid) -> Result<()> {
        self.write()
            .products
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::NotFound("product"))
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        Ok(self.read().coupons.clone())
    }

    async fn find_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self
            .read()
            .coupons
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(code))
            .cloned())
    }

    async fn insert_coupon(&self, coupon: Coupon) -> Result<Coupon> {
        self.write().coupons.push(coupon.clone());
        Ok(coupon)
    }

    async fn update_coupon(&self, code: &str, coupon: Coupon) -> Result<Coupon> {
        let mut inner = self.write();
        let slot = inner
            .coupons
            .iter_mut()
            .find(|c| c.code.eq_ignore_ascii_case(code))
            .ok_or(Error::NotFound("coupon"))?;
        *slot = coupon.clone();
        Ok(coupon)
    }

    async fn delete_coupon(&self, code: &str) -> Result<()> {
        let mut inner = self.write();
        let before = inner.coupons.len();
        inner.coupons.retain(|c| !c.code.eq_ignore_ascii_case(code));
        if inner.coupons.len() == before {
            return Err(Error::NotFound("coupon"));
        }
        Ok(())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let mut orders: Vec<_> = self.read().orders.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        let mut orders: Vec<_> = self
            .read()
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.read().orders.get(&id).cloned())
    }

    async fn place_order(&self, order: Order) -> Result<(Order, Vec<StockLevel>)> {
        let mut inner = self.write();

        // Re-check the coupon against current state at commit time; a stale
        // snapshot applied in the UI must not survive an edit or delete.
        if let Some(snapshot) = &order.coupon {
            let coupon = inner
                .coupons
                .iter()
                .find(|c| c.code.eq_ignore_ascii_case(&snapshot.code))
                .ok_or(Error::Coupon(crate::domain::coupon::CouponError::NotFound))?;
            coupon.check(&order.subtotal, Utc::now())?;
        }

        // Verify every line before mutating anything.
        for item in &order.items {
            let product = inner
                .products
                .get(&item.product_id)
                .ok_or(Error::NotFound("product"))?;
            if !product.can_fulfill(item.quantity) {
                return Err(Error::InsufficientStock {
                    product_id: item.product_id,
                    available: product.available().unwrap_or(0),
                    requested: item.quantity,
                });
            }
        }

        let mut levels = Vec::new();
        for item in &order.items {
            let product = inner
                .products
                .get_mut(&item.product_id)
                .ok_or(Error::NotFound("product"))?;
            if product.stock.is_some() {
                product.decrement_stock(item.quantity);
                levels.push(StockLevel {
                    product_id: item.product_id,
                    remaining: product.available().unwrap_or(0),
                });
            }
        }

        inner.orders.insert(order.id, order.clone());
        Ok((order, levels))
    }

    async fn update_order(&self, order: Order) -> Result<Order> {
        let mut inner = self.write();
        if !inner.orders.contains_key(&order.id) {
            return Err(Error::NotFound("order"));
        }
        inner.orders.insert(order.id, order.clone());
        Ok(order)
    }
}
