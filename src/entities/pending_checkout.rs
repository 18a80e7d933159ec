use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A priced checkout snapshot awaiting payment confirmation.
///
/// Rows older than the configured session TTL are swept periodically;
/// confirmation of a swept session fails with a session-expired error.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pending_checkouts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub gateway_order_id: String,
    pub user_id: Option<String>,

    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,

    /// Priced line items frozen at checkout time
    /// (array of {product_id, name, unit_price, quantity}).
    #[sea_orm(column_type = "Json")]
    pub line_items: Json,

    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<String>,

    #[sea_orm(column_type = "Json")]
    pub shipping_address: Json,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// One priced line inside `Model::line_items`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLine {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}
