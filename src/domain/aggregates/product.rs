//! Product aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Money, Quantity};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub category: Option<String>,
    pub image_url: Option<String>,
    /// `None` means stock is untracked (unlimited availability).
    pub stock: Option<Quantity>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, price: Money) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            sku: sku.into(),
            name: name.into(),
            description: String::new(),
            price,
            category: None,
            image_url: None,
            stock: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_stock(mut self, units: u32) -> Self {
        self.stock = Some(Quantity::new(units));
        self
    }

    /// Units available for ordering. Untracked stock never blocks an order.
    pub fn available(&self) -> Option<u32> {
        self.stock.map(|q| q.value())
    }

    pub fn can_fulfill(&self, quantity: u32) -> bool {
        match self.stock {
            Some(stock) => quantity <= stock.value(),
            None => true,
        }
    }

    /// Stock adjustment after an accepted order: floors at zero when
    /// tracked, no-op when untracked.
    pub fn decrement_stock(&mut self, quantity: u32) {
        if let Some(stock) = self.stock {
            self.stock = Some(stock.saturating_subtract(quantity));
            self.touch();
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn product(stock: Option<u32>) -> Product {
        let p = Product::new("P-001", "Widget", Money::inr(Decimal::new(100, 0)));
        match stock {
            Some(units) => p.with_stock(units),
            None => p,
        }
    }

    #[test]
    fn tracked_stock_decrements_and_floors_at_zero() {
        let mut p = product(Some(3));
        p.decrement_stock(2);
        assert_eq!(p.available(), Some(1));
        p.decrement_stock(5);
        assert_eq!(p.available(), Some(0));
    }

    #[test]
    fn untracked_stock_is_a_noop() {
        let mut p = product(None);
        p.decrement_stock(10);
        assert_eq!(p.available(), None);
        assert!(p.can_fulfill(1_000_000));
    }

    #[test]
    fn can_fulfill_respects_tracked_stock() {
        let p = product(Some(3));
        assert!(p.can_fulfill(3));
        assert!(!p.can_fulfill(5));
    }
}
