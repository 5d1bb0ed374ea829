//! Domain aggregates

pub mod cart;
pub mod order;
pub mod product;

pub use cart::{Cart, CartItem};
pub use order::{Order, OrderItem, OrderStatus, PaymentInfo, PaymentStatus, ShippingDetails, TrackingEvent, TrackingInfo};
pub use product::Product;
