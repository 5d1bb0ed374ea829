//! Postgres store.
//!
//! Runtime queries over plain row structs; domain conversion happens at the
//! edge. Order acceptance runs in one transaction with `FOR UPDATE` row
//! locks on the products and the coupon.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::order::{Order, OrderStatus};
use crate::domain::aggregates::product::Product;
use crate::domain::coupon::{Coupon, Discount};
use crate::domain::value_objects::{Money, Quantity};
use crate::store::{StockLevel, Store};
use crate::{Error, Result};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    description: String,
    price: Decimal,
    currency: String,
    category: Option<String>,
    image_url: Option<String>,
    stock: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            sku: row.sku,
            name: row.name,
            description: row.description,
            price: Money::new(row.price, &row.currency),
            category: row.category,
            image_url: row.image_url,
            stock: row.stock.map(|s| Quantity::new(s.max(0) as u32)),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    code: String,
    discount_type: String,
    discount_value: Decimal,
    currency: String,
    expires_at: DateTime<Utc>,
    minimum_amount: Option<Decimal>,
    is_active: bool,
}

impl From<CouponRow> for Coupon {
    fn from(row: CouponRow) -> Self {
        let discount = match row.discount_type.as_str() {
            "flat" => Discount::Flat(Money::new(row.discount_value, &row.currency)),
            _ => Discount::Percentage(row.discount_value),
        };
        Coupon {
            code: row.code,
            discount,
            expires_at: row.expires_at,
            minimum_amount: row.minimum_amount.map(|m| Money::new(m, &row.currency)),
            is_active: row.is_active,
        }
    }
}

fn coupon_columns(coupon: &Coupon) -> (&'static str, Decimal, String) {
    match &coupon.discount {
        Discount::Percentage(pct) => ("percentage", *pct, "INR".to_string()),
        Discount::Flat(amount) => ("flat", amount.amount(), amount.currency().to_string()),
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: String,
    user_email: String,
    items: serde_json::Value,
    subtotal: Decimal,
    discount: Decimal,
    tax: Decimal,
    total: Decimal,
    currency: String,
    status: String,
    shipping: serde_json::Value,
    coupon: Option<serde_json::Value>,
    courier_id: Option<String>,
    payment: Option<serde_json::Value>,
    tracking: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = Error;

    fn try_from(row: OrderRow) -> Result<Self> {
        let decode = |what: &str, err: serde_json::Error| {
            Error::Storage(format!("corrupt {what} column: {err}"))
        };
        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            user_id: row.user_id,
            user_email: row.user_email,
            items: serde_json::from_value(row.items).map_err(|e| decode("items", e))?,
            subtotal: Money::new(row.subtotal, &row.currency),
            discount: Money::new(row.discount, &row.currency),
            tax: Money::new(row.tax, &row.currency),
            total: Money::new(row.total, &row.currency),
            status: row
                .status
                .parse::<OrderStatus>()
                .map_err(Error::Storage)?,
            shipping: serde_json::from_value(row.shipping).map_err(|e| decode("shipping", e))?,
            coupon: row
                .coupon
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| decode("coupon", e))?,
            courier_id: row.courier_id,
            payment: row
                .payment
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| decode("payment", e))?,
            tracking: row
                .tracking
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| decode("tracking", e))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| Error::Storage(e.to_string()))
}

#[async_trait]
impl Store for PgStore {
    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    async fn insert_product(&self, product: Product) -> Result<Product> {
        sqlx::query(
            "INSERT INTO products (id, sku, name, description, price, currency, category, image_url, stock, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(product.price.currency())
        .bind(&product.category)
        .bind(&product.image_url)
        .bind(product.stock.map(|s| s.value() as i32))
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(product)
    }

    async fn update_product(&self, product: Product) -> Result<Product> {
        let result = sqlx::query(
            "UPDATE products SET sku = $2, name = $3, description = $4, price = $5, currency = $6, \
             category = $7, image_url = $8, stock = $9, updated_at = NOW() WHERE id = $1",
        )
        .bind(product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(product.price.currency())
        .bind(&product.category)
        .bind(&product.image_url)
        .bind(product.stock.map(|s| s.value() as i32))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("product"));
        }
        Ok(product)
    }

    async fn delete_product(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("product"));
        }
        Ok(())
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons ORDER BY code")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Coupon::from).collect())
    }

    async fn find_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(
            "SELECT * FROM coupons WHERE LOWER(code) = LOWER($1)",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Coupon::from))
    }

    async fn insert_coupon(&self, coupon: Coupon) -> Result<Coupon> {
        let (kind, value, currency) = coupon_columns(&coupon);
        sqlx::query(
            "INSERT INTO coupons (code, discount_type, discount_value, currency, expires_at, minimum_amount, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&coupon.code)
        .bind(kind)
        .bind(value)
        .bind(currency)
        .bind(coupon.expires_at)
        .bind(coupon.minimum_amount.as_ref().map(|m| m.amount()))
        .bind(coupon.is_active)
        .execute(&self.pool)
        .await?;
        Ok(coupon)
    }

    async fn update_coupon(&self, code: &str, coupon: Coupon) -> Result<Coupon> {
        let (kind, value, currency) = coupon_columns(&coupon);
        let result = sqlx::query(
            "UPDATE coupons SET code = $2, discount_type = $3, discount_value = $4, currency = $5, \
             expires_at = $6, minimum_amount = $7, is_active = $8 WHERE LOWER(code) = LOWER($1)",
        )
        .bind(code)
        .bind(&coupon.code)
        .bind(kind)
        .bind(value)
        .bind(currency)
        .bind(coupon.expires_at)
        .bind(coupon.minimum_amount.as_ref().map(|m| m.amount()))
        .bind(coupon.is_active)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("coupon"));
        }
        Ok(coupon)
    }

    async fn delete_coupon(&self, code: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM coupons WHERE LOWER(code) = LOWER($1)")
            .bind(code)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("coupon"));
        }
        Ok(())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Order::try_from).transpose()
    }

    async fn place_order(&self, order: Order) -> Result<(Order, Vec<StockLevel>)> {
        let mut tx = self.pool.begin().await?;

        // Stale-coupon guard: the snapshot was validated at apply time, the
        // live row decides at commit time.
        if let Some(snapshot) = &order.coupon {
            let row = sqlx::query_as::<_, CouponRow>(
                "SELECT * FROM coupons WHERE LOWER(code) = LOWER($1) FOR UPDATE",
            )
            .bind(&snapshot.code)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(Error::Coupon(crate::domain::coupon::CouponError::NotFound))?;
            Coupon::from(row).check(&order.subtotal, Utc::now())?;
        }

        let mut levels = Vec::new();
        for item in &order.items {
            let stock: Option<Option<i32>> = sqlx::query_scalar(
                "SELECT stock FROM products WHERE id = $1 FOR UPDATE",
            )
            .bind(item.product_id)
            .fetch_optional(&mut *tx)
            .await?;
            let stock = stock.ok_or(Error::NotFound("product"))?;

            // Untracked stock (NULL) never blocks an order.
            if let Some(available) = stock {
                let available = available.max(0) as u32;
                if item.quantity > available {
                    return Err(Error::InsufficientStock {
                        product_id: item.product_id,
                        available,
                        requested: item.quantity,
                    });
                }
                let remaining = available - item.quantity;
                sqlx::query("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1")
                    .bind(item.product_id)
                    .bind(remaining as i32)
                    .execute(&mut *tx)
                    .await?;
                levels.push(StockLevel { product_id: item.product_id, remaining });
            }
        }

        sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, user_email, items, subtotal, discount, tax, total, currency, \
             status, shipping, coupon, courier_id, payment, tracking, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(&order.user_id)
        .bind(&order.user_email)
        .bind(encode(&order.items)?)
        .bind(order.subtotal.amount())
        .bind(order.discount.amount())
        .bind(order.tax.amount())
        .bind(order.total.amount())
        .bind(order.total.currency())
        .bind(order.status.as_str())
        .bind(encode(&order.shipping)?)
        .bind(order.coupon.as_ref().map(encode).transpose()?)
        .bind(&order.courier_id)
        .bind(order.payment.as_ref().map(encode).transpose()?)
        .bind(order.tracking.as_ref().map(encode).transpose()?)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((order, levels))
    }

    async fn update_order(&self, order: Order) -> Result<Order> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, courier_id = $3, payment = $4, tracking = $5, updated_at = $6 \
             WHERE id = $1",
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(&order.courier_id)
        .bind(order.payment.as_ref().map(encode).transpose()?)
        .bind(order.tracking.as_ref().map(encode).transpose()?)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("order"));
        }
        Ok(order)
    }
}
