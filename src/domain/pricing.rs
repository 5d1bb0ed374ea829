//! Order pricing engine.
//!
//! The single authority for subtotal / discount / tax / total. Checkout
//! preview, order creation and invoice rendering all call [`price`]; no
//! caller reimplements the formula.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::cart::CartItem;
use crate::domain::coupon::{Coupon, Discount};
use crate::domain::value_objects::{Money, MoneyError};

/// Flat VAT-equivalent applied to the discounted subtotal.
pub const TAX_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2); // 0.05

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

impl Pricing {
    /// Rounds every component half-up to 2 places for persistence/display.
    pub fn rounded(&self) -> Pricing {
        Pricing {
            subtotal: self.subtotal.rounded(),
            discount: self.discount.rounded(),
            tax: self.tax.rounded(),
            total: self.total.rounded(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PricingError {
    #[error("order has no items")]
    EmptyOrder,
    #[error("order mixes currencies")]
    CurrencyMismatch,
}

impl From<MoneyError> for PricingError {
    fn from(err: MoneyError) -> Self {
        match err {
            MoneyError::CurrencyMismatch => PricingError::CurrencyMismatch,
        }
    }
}

/// Prices a set of cart items with an optional coupon.
///
/// Order of operations is fixed: subtotal, then discount (clamped to the
/// subtotal so the total can never go negative), then 5% tax on the
/// discounted amount. All arithmetic is full-precision decimal; rounding
/// is the caller's boundary concern ([`Pricing::rounded`]).
///
/// Every line and any flat discount must share one currency; a mixed cart
/// or a foreign-currency coupon is an error, never a partial result.
pub fn price(items: &[CartItem], coupon: Option<&Coupon>) -> Result<Pricing, PricingError> {
    if items.is_empty() {
        return Err(PricingError::EmptyOrder);
    }
    let currency = items[0].unit_price.currency().to_string();

    let mut subtotal = Money::zero(&currency);
    for item in items {
        subtotal = subtotal.add(&item.line_total())?;
    }

    let discount = match coupon.map(|c| &c.discount) {
        Some(Discount::Percentage(pct)) => {
            subtotal.scale(*pct / Decimal::ONE_HUNDRED)
        }
        Some(Discount::Flat(amount)) => {
            // Must be checked before the clamp; min() against the
            // subtotal would hide the mismatch.
            if amount.currency() != subtotal.currency() {
                return Err(PricingError::CurrencyMismatch);
            }
            amount.clone()
        }
        None => Money::zero(&currency),
    }
    .min(subtotal.clone());

    let taxable = subtotal.subtract(&discount)?;
    let tax = taxable.scale(TAX_RATE);
    let total = taxable.add(&tax)?;

    Ok(Pricing { subtotal, discount, tax, total })
}
