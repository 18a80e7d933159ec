use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of an order. Transitions are enforced in the order
/// service; the entity only stores the value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "unpaid")]
    Unpaid,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-facing order number (ORD_{millis}_{suffix}).
    pub order_number: String,
    pub user_id: Option<String>,

    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,

    pub status: OrderStatus,
    pub payment_status: PaymentStatus,

    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub coupon_code: Option<String>,

    #[sea_orm(column_type = "Json")]
    pub shipping_address: Json,

    /// Identifier we generated for the payment gateway; unique across orders.
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub payment_method: Option<String>,

    pub shipment_order_id: Option<String>,
    pub shipment_id: Option<String>,
    pub awb_code: Option<String>,
    pub courier_id: Option<String>,
    pub courier_name: Option<String>,
    /// Carrier status text verbatim, including values we do not project.
    pub current_shipment_status: Option<String>,
    pub awb_assigned_at: Option<DateTime<Utc>>,
    pub pickup_scheduled_at: Option<DateTime<Utc>>,
    pub shipment_created_at: Option<DateTime<Utc>>,
    pub shipment_cancelled_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl OrderStatus {
    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            // Any forward move is allowed, including skips when intermediate
            // events were missed
            (Pending, Processing) | (Pending, Shipped) | (Pending, Delivered) => true,
            (Processing, Shipped) | (Processing, Delivered) => true,
            (Shipped, Delivered) => true,
            (Pending, Cancelled) | (Processing, Cancelled) | (Shipped, Cancelled) => true,
            // Re-applying the current state is a no-op, not a violation
            (a, b) if *a == b => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_allowed() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn forward_skips_allowed() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn cancellation_reachable_until_delivery() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn no_backward_transitions() {
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn self_transition_is_noop() {
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Processing));
    }
}
