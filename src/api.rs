//! HTTP surface: routes, request DTOs and error mapping.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::cart::CartItem;
use crate::domain::aggregates::order::{Order, OrderStatus, PaymentStatus, ShippingDetails, TrackingInfo};
use crate::domain::aggregates::product::Product;
use crate::domain::coupon::{Coupon, Discount};
use crate::domain::pricing::Pricing;
use crate::domain::value_objects::Money;
use crate::invoice::render_invoice;
use crate::service::OrderService;
use crate::store::Store;
use crate::{Error, Result};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub service: Arc<OrderService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront"})) }),
        )
        .route("/api/v1/products", get(list_products).post(create_product))
        .route(
            "/api/v1/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/api/v1/coupons", get(list_coupons).post(create_coupon))
        .route(
            "/api/v1/coupons/:code",
            axum::routing::put(update_coupon).delete(delete_coupon),
        )
        .route("/api/v1/coupons/validate", post(validate_coupon))
        .route("/api/v1/checkout/preview", post(preview_pricing))
        .route("/api/v1/orders", get(list_orders).post(create_order))
        .route("/api/v1/orders/user/:user_id", get(orders_for_user))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/status", patch(update_status))
        .route("/api/v1/orders/:id/courier", patch(update_courier))
        .route("/api/v1/orders/:id/payment", patch(complete_payment))
        .route("/api/v1/orders/:id/charge", post(charge_order))
        .route("/api/v1/orders/:id/tracking", get(refresh_tracking))
        .route("/api/v1/orders/:id/invoice", get(download_invoice))
        .with_state(state)
}

pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::EmptyOrder | Error::Validation(_) | Error::Coupon(_) => StatusCode::BAD_REQUEST,
            Error::InsufficientStock { .. } | Error::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Payment(_) => StatusCode::BAD_GATEWAY,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({"error": self.0.to_string()}))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn bad_request(message: impl ToString) -> ApiError {
    ApiError(Error::Validation(message.to_string()))
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct ProductRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub stock: Option<u32>,
}

impl ProductRequest {
    /// Shared by create and update so neither path can persist a bad price.
    fn check(&self) -> ApiResult<()> {
        self.validate().map_err(|e| bad_request(e.to_string()))?;
        if self.price.is_sign_negative() {
            return Err(bad_request("price must be non-negative"));
        }
        Ok(())
    }
}

async fn list_products(State(state): State<AppState>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(state.store.list_products().await?))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Product>> {
    let product = state
        .store
        .get_product(id)
        .await?
        .ok_or(Error::NotFound("product"))?;
    Ok(Json(product))
}

async fn create_product(
    State(state): State<AppState>,
    Json(req): Json<ProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    req.check()?;
    let currency = req.currency.as_deref().unwrap_or("INR");
    let sku = req
        .sku
        .unwrap_or_else(|| format!("SKU-{:08}", rand::random::<u32>() % 100_000_000));
    let mut product = Product::new(
        sku,
        req.name,
        Money::new(req.price, currency),
    );
    product.description = req.description;
    product.category = req.category;
    product.image_url = req.image_url;
    if let Some(units) = req.stock {
        product = product.with_stock(units);
    }
    let product = state.store.insert_product(product).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProductRequest>,
) -> ApiResult<Json<Product>> {
    req.check()?;
    let mut product = state
        .store
        .get_product(id)
        .await?
        .ok_or(Error::NotFound("product"))?;
    let currency = req
        .currency
        .unwrap_or_else(|| product.price.currency().to_string());
    product.name = req.name;
    product.description = req.description;
    product.price = Money::new(req.price, &currency);
    if let Some(sku) = req.sku {
        product.sku = sku;
    }
    product.category = req.category;
    product.image_url = req.image_url;
    product.stock = req.stock.map(crate::domain::value_objects::Quantity::new);
    product.touch();
    Ok(Json(state.store.update_product(product).await?))
}

async fn delete_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.store.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Coupons
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CouponRequest {
    pub code: String,
    pub discount: Discount,
    pub expires_at: DateTime<Utc>,
    pub minimum_amount: Option<Decimal>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl CouponRequest {
    fn into_coupon(self) -> Coupon {
        // The minimum threshold lives in the same currency as a flat
        // discount; percentage coupons default to the store currency.
        let currency = match &self.discount {
            Discount::Flat(amount) => amount.currency().to_string(),
            Discount::Percentage(_) => "INR".to_string(),
        };
        Coupon {
            code: self.code,
            discount: self.discount,
            expires_at: self.expires_at,
            minimum_amount: self.minimum_amount.map(|m| Money::new(m, &currency)),
            is_active: self.is_active,
        }
    }
}

async fn list_coupons(State(state): State<AppState>) -> ApiResult<Json<Vec<Coupon>>> {
    Ok(Json(state.store.list_coupons().await?))
}

async fn create_coupon(
    State(state): State<AppState>,
    Json(req): Json<CouponRequest>,
) -> ApiResult<(StatusCode, Json<Coupon>)> {
    let coupon = state.store.insert_coupon(req.into_coupon()).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

async fn update_coupon(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<CouponRequest>,
) -> ApiResult<Json<Coupon>> {
    Ok(Json(state.store.update_coupon(&code, req.into_coupon()).await?))
}

async fn delete_coupon(State(state): State<AppState>, Path(code): Path<String>) -> ApiResult<StatusCode> {
    state.store.delete_coupon(&code).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ValidateCouponResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon: Option<Coupon>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// UI-facing check; order creation re-validates at commit time.
async fn validate_coupon(
    State(state): State<AppState>,
    Json(req): Json<ValidateCouponRequest>,
) -> ApiResult<Json<ValidateCouponResponse>> {
    let subtotal = Money::inr(req.amount);
    let coupons = state.store.list_coupons().await?;
    let outcome = match crate::domain::coupon::validate(&req.code, &subtotal, &coupons, Utc::now())
    {
        Ok(coupon) => ValidateCouponResponse {
            valid: true,
            coupon: Some(coupon.clone()),
            message: None,
        },
        Err(err) => ValidateCouponResponse {
            valid: false,
            coupon: None,
            message: Some(err.to_string()),
        },
    };
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// Checkout & orders
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ItemRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// Resolves requested product ids into priced cart lines using the current
/// catalog. Client-supplied prices are never trusted.
async fn resolve_items(store: &dyn Store, items: &[ItemRequest]) -> Result<Vec<CartItem>> {
    let mut resolved = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity == 0 {
            return Err(Error::Validation("item quantity must be at least 1".into()));
        }
        let product = store
            .get_product(item.product_id)
            .await?
            .ok_or(Error::NotFound("product"))?;
        resolved.push(CartItem {
            product_id: product.id,
            name: product.name,
            sku: product.sku,
            quantity: item.quantity,
            unit_price: product.price,
        });
    }
    Ok(resolved)
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub items: Vec<ItemRequest>,
    pub coupon_code: Option<String>,
}

async fn preview_pricing(
    State(state): State<AppState>,
    Json(req): Json<PreviewRequest>,
) -> ApiResult<Json<Pricing>> {
    let items = resolve_items(state.store.as_ref(), &req.items).await?;
    let pricing = state
        .service
        .preview(&items, req.coupon_code.as_deref())
        .await?;
    Ok(Json(pricing.rounded()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(email)]
    pub email: String,
    pub items: Vec<ItemRequest>,
    pub shipping: ShippingDetails,
    pub coupon_code: Option<String>,
}

async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    req.validate()
        .map_err(|e| bad_request(e.to_string()))?;
    let items = resolve_items(state.store.as_ref(), &req.items).await?;
    let order = state
        .service
        .create_order(
            &req.user_id,
            &req.email,
            items,
            req.shipping,
            req.coupon_code.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(State(state): State<AppState>) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(state.store.list_orders().await?))
}

async fn orders_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(state.store.orders_for_user(&user_id).await?))
}

async fn get_order(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(state.service.get_order(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.service.update_status(id, req.status).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCourierRequest {
    #[validate(length(min = 1))]
    pub courier_id: String,
}

async fn update_courier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCourierRequest>,
) -> ApiResult<Json<Order>> {
    req.validate()
        .map_err(|e| bad_request(e.to_string()))?;
    Ok(Json(state.service.update_courier(id, &req.courier_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CompletePaymentRequest {
    pub payment_id: String,
    pub payment_method: String,
    #[serde(default = "completed")]
    pub payment_status: PaymentStatus,
}

fn completed() -> PaymentStatus {
    PaymentStatus::Completed
}

async fn complete_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompletePaymentRequest>,
) -> ApiResult<Json<Order>> {
    Ok(Json(
        state
            .service
            .complete_payment(id, req.payment_id, req.payment_method, req.payment_status)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ChargeRequest {
    pub payment_method: String,
}

async fn charge_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChargeRequest>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.service.charge(id, &req.payment_method).await?))
}

async fn refresh_tracking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Option<TrackingInfo>>> {
    Ok(Json(state.service.refresh_tracking(id).await?))
}

async fn download_invoice(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Response> {
    let order = state.service.get_order(id).await?;
    let body = render_invoice(&order);
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"invoice-{}.txt\"", order.order_number),
            ),
        ],
        body,
    )
        .into_response())
}
