//! Coupons and the coupon validator.
//!
//! Validation is a pure function over the coupons handed in; side effects
//! (toasts, persistence, re-checks at order commit) belong to callers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Percentage of the subtotal, 0–100.
    Percentage(Decimal),
    /// Fixed amount off the subtotal.
    Flat(Money),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount: Discount,
    pub expires_at: DateTime<Utc>,
    pub minimum_amount: Option<Money>,
    pub is_active: bool,
}

impl Coupon {
    /// Checks this coupon against a subtotal at a point in time.
    ///
    /// An inactive coupon reports `NotFound` rather than a dedicated error,
    /// so callers cannot distinguish "disabled" from "never existed".
    pub fn check(&self, subtotal: &Money, now: DateTime<Utc>) -> Result<(), CouponError> {
        if !self.is_active {
            return Err(CouponError::NotFound);
        }
        if self.expires_at <= now {
            return Err(CouponError::Expired);
        }
        if let Some(minimum) = &self.minimum_amount {
            if subtotal.amount() < minimum.amount() {
                return Err(CouponError::BelowMinimum { minimum: minimum.clone() });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CouponError {
    #[error("invalid coupon code")]
    NotFound,
    #[error("coupon has expired")]
    Expired,
    #[error("minimum order amount for this coupon is {minimum}")]
    BelowMinimum { minimum: Money },
}

/// Looks up `code` case-insensitively in `coupons` and checks it against
/// `subtotal` at `now`. Returns the matched coupon unchanged.
pub fn validate<'a>(
    code: &str,
    subtotal: &Money,
    coupons: &'a [Coupon],
    now: DateTime<Utc>,
) -> Result<&'a Coupon, CouponError> {
    let coupon = coupons
        .iter()
        .find(|c| c.code.eq_ignore_ascii_case(code))
        .ok_or(CouponError::NotFound)?;
    coupon.check(subtotal, now)?;
    Ok(coupon)
}

/// Coupon fields copied into an order at creation time. Later edits or
/// deletion of the coupon never affect a placed order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CouponSnapshot {
    pub code: String,
    pub discount: Discount,
}

impl From<&Coupon> for CouponSnapshot {
    fn from(coupon: &Coupon) -> Self {
        Self {
            code: coupon.code.clone(),
            discount: coupon.discount.clone(),
        }
    }
}
