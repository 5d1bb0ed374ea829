//! Value objects shared across the domain

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Money value object.
///
/// Arithmetic keeps full decimal precision; rounding to 2 fraction digits
/// (half-up, away from zero) happens once, at the persistence/display
/// boundary via [`Money::rounded`]. Intermediate pricing steps must never
/// round.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self {
        Self { amount, currency: currency.to_string() }
    }

    pub fn inr(amount: Decimal) -> Self {
        Self::new(amount, "INR")
    }

    pub fn zero(currency: &str) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch);
        }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }

    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch);
        }
        Ok(Money::new(self.amount - other.amount, &self.currency))
    }

    pub fn multiply(&self, qty: u32) -> Money {
        Money::new(self.amount * Decimal::from(qty), &self.currency)
    }

    /// Fractional multiplier, e.g. a tax rate or a percentage / 100.
    pub fn scale(&self, factor: Decimal) -> Money {
        Money::new(self.amount * factor, &self.currency)
    }

    pub fn min(self, other: Money) -> Money {
        if other.amount < self.amount {
            other
        } else {
            self
        }
    }

    /// Round half-up to 2 fraction digits. Boundary use only.
    pub fn rounded(&self) -> Money {
        Money::new(
            self.amount
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            &self.currency,
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero("INR")
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.currency, self.rounded().amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("currency mismatch")]
    CurrencyMismatch,
}

/// Stock quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn add(&self, other: u32) -> Self {
        Self(self.0.saturating_add(other))
    }

    /// Floors at zero, matching the storefront's stock adjustment rule.
    pub fn saturating_subtract(&self, other: u32) -> Self {
        Self(self.0.saturating_sub(other))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_add_same_currency() {
        let a = Money::inr(Decimal::new(100, 0));
        let b = Money::inr(Decimal::new(50, 0));
        assert_eq!(a.add(&b).unwrap().amount(), Decimal::new(150, 0));
    }

    #[test]
    fn money_add_rejects_currency_mismatch() {
        let a = Money::inr(Decimal::ONE);
        let b = Money::new(Decimal::ONE, "USD");
        assert_eq!(a.add(&b), Err(MoneyError::CurrencyMismatch));
    }

    #[test]
    fn rounding_is_half_up_at_two_places() {
        let m = Money::inr(Decimal::new(999_905, 3)); // 999.905
        assert_eq!(m.rounded().amount(), Decimal::new(99_991, 2)); // 999.91
        let n = Money::inr(Decimal::new(209_979, 1)); // 20997.9
        assert_eq!(n.rounded().amount(), Decimal::new(2_099_790, 2));
    }

    #[test]
    fn quantity_floors_at_zero() {
        let q = Quantity::new(3);
        assert_eq!(q.saturating_subtract(5).value(), 0);
    }
}
