pub mod coupon;
pub mod order;
pub mod order_item;
pub mod pending_checkout;
pub mod product;

pub use order::{OrderStatus, PaymentStatus};
