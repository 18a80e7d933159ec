pub mod checkout;
pub mod coupons;
pub mod inventory;
pub mod orders;
pub mod payment_confirmation;
pub mod shipments;

pub use checkout::CheckoutService;
pub use coupons::CouponService;
pub use inventory::InventoryService;
pub use orders::OrderService;
pub use payment_confirmation::PaymentConfirmationService;
pub use shipments::ShipmentService;
