use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Stored uppercase; lookups normalize the input first.
    pub code: String,
    pub discount_percentage: i32,
    pub expires_at: DateTime<Utc>,

    /// When set, only this user may redeem the coupon.
    pub user_id: Option<String>,

    pub is_active: bool,
    pub usage_count: i32,
    /// None means unlimited redemptions.
    pub usage_limit: Option<i32>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn is_exhausted(&self) -> bool {
        match self.usage_limit {
            Some(limit) => self.usage_count >= limit,
            None => false,
        }
    }
}
