//! Pure domain core: no I/O, unit-testable in isolation.

pub mod aggregates;
pub mod coupon;
pub mod events;
pub mod pricing;
pub mod value_objects;
