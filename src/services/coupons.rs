use crate::{
    db::DbPool,
    entities::coupon::{self, Entity as Coupons},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{Duration, Utc};
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A validated coupon ready to be applied to a checkout.
#[derive(Debug, Clone)]
pub struct ValidatedCoupon {
    pub code: String,
    pub discount_percentage: i32,
}

#[derive(Debug, Clone)]
pub struct CreateCoupon {
    pub code: String,
    pub discount_percentage: i32,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub user_id: Option<String>,
    pub usage_limit: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCoupon {
    pub discount_percentage: Option<i32>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub is_active: Option<bool>,
}

/// Rounds a computed money amount to whole currency units, half away from
/// zero. All derived checkout amounts (tax, discount) go through this.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Clone)]
pub struct CouponService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    reward_percentage: i32,
    reward_validity_days: i64,
}

impl CouponService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        reward_percentage: u32,
        reward_validity_days: i64,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            reward_percentage: reward_percentage as i32,
            reward_validity_days,
        }
    }

    /// Validates a coupon code for a (possibly anonymous) user.
    ///
    /// An expired coupon is deactivated on the spot, so listings stop
    /// showing it without a background job.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        user_id: Option<&str>,
    ) -> Result<ValidatedCoupon, ServiceError> {
        let normalized = code.trim().to_uppercase();
        let coupon = Coupons::find()
            .filter(coupon::Column::Code.eq(normalized.clone()))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::CouponError("Invalid coupon code".into()))?;

        if !coupon.is_active {
            return Err(ServiceError::CouponError("Coupon is no longer active".into()));
        }

        if coupon.is_expired(Utc::now()) {
            let mut active: coupon::ActiveModel = coupon.into();
            active.is_active = Set(false);
            active.updated_at = Set(Some(Utc::now()));
            active.update(&*self.db_pool).await?;
            return Err(ServiceError::CouponError("Coupon has expired".into()));
        }

        if let Some(owner) = &coupon.user_id {
            if user_id != Some(owner.as_str()) {
                return Err(ServiceError::CouponError(
                    "Coupon does not belong to this user".into(),
                ));
            }
        }

        if coupon.is_exhausted() {
            return Err(ServiceError::CouponError(
                "Coupon usage limit reached".into(),
            ));
        }

        Ok(ValidatedCoupon {
            code: coupon.code,
            discount_percentage: coupon.discount_percentage,
        })
    }

    /// Discount amount for a subtotal at a given percentage.
    pub fn apply_to_total(&self, discount_percentage: i32, subtotal: Decimal) -> Decimal {
        round_money(subtotal * Decimal::from(discount_percentage) / Decimal::from(100))
    }

    /// Burns one use of the coupon. The usage-limit check lives inside the
    /// UPDATE's WHERE clause, so two racing redemptions cannot both pass a
    /// limit of one.
    #[instrument(skip(self))]
    pub async fn redeem(&self, code: &str, user_id: Option<&str>) -> Result<(), ServiceError> {
        let normalized = code.trim().to_uppercase();
        let db = &*self.db_pool;
        let backend = db.get_database_backend();

        let mut update = sea_orm::sea_query::Query::update();
        update
            .table(coupon::Entity)
            .value(
                coupon::Column::UsageCount,
                Expr::col(coupon::Column::UsageCount).add(1),
            )
            .value(coupon::Column::UpdatedAt, Utc::now())
            .and_where(Expr::col(coupon::Column::Code).eq(normalized.clone()))
            .and_where(Expr::col(coupon::Column::IsActive).eq(true))
            .and_where(
                Condition::any()
                    .add(Expr::col(coupon::Column::UsageLimit).is_null())
                    .add(
                        Expr::col(coupon::Column::UsageCount)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    )
                    .into(),
            );

        let result = db.execute(backend.build(&update)).await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::CouponError(
                "Coupon usage limit reached".into(),
            ));
        }

        self.event_sender
            .send_or_log(Event::CouponRedeemed {
                code: normalized,
                user_id: user_id.map(str::to_string),
            })
            .await;

        Ok(())
    }

    /// Issues the reward coupon earned by a high-value order.
    ///
    /// Any prior active coupon for the user is superseded rather than
    /// blocking the issue; a paid order's confirmation must not fail on a
    /// coupon policy.
    #[instrument(skip(self))]
    pub async fn issue_reward_coupon(
        &self,
        user_id: &str,
        order_id: Uuid,
    ) -> Result<coupon::Model, ServiceError> {
        let db = &*self.db_pool;

        let superseded = Coupons::update_many()
            .col_expr(coupon::Column::IsActive, Expr::value(false))
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::UserId.eq(user_id))
            .filter(coupon::Column::IsActive.eq(true))
            .exec(db)
            .await?;
        if superseded.rows_affected > 0 {
            info!(
                user_id = user_id,
                count = superseded.rows_affected,
                "Superseded prior active coupon(s)"
            );
        }

        let code = generate_coupon_code();
        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            discount_percentage: Set(self.reward_percentage),
            expires_at: Set(now + Duration::days(self.reward_validity_days)),
            user_id: Set(Some(user_id.to_string())),
            is_active: Set(true),
            usage_count: Set(0),
            usage_limit: Set(Some(1)),
            created_at: Set(now),
            updated_at: Set(None),
        };
        let created = model.insert(db).await?;

        info!(user_id = user_id, code = %created.code, "Reward coupon issued");
        self.event_sender
            .send_or_log(Event::RewardCouponIssued {
                code: created.code.clone(),
                user_id: user_id.to_string(),
                order_id,
            })
            .await;

        Ok(created)
    }

    /// The user's current active coupon, if any.
    #[instrument(skip(self))]
    pub async fn active_coupon_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        Ok(Coupons::find()
            .filter(coupon::Column::UserId.eq(user_id))
            .filter(coupon::Column::IsActive.eq(true))
            .order_by_desc(coupon::Column::CreatedAt)
            .one(&*self.db_pool)
            .await?)
    }

    /// Admin create. Unlike the reward path, this refuses when the target
    /// user already holds an active coupon.
    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateCoupon) -> Result<coupon::Model, ServiceError> {
        if !(1..=100).contains(&request.discount_percentage) {
            return Err(ServiceError::ValidationError(
                "Discount percentage must be between 1 and 100".into(),
            ));
        }
        if request.expires_at <= Utc::now() {
            return Err(ServiceError::ValidationError(
                "Expiry must be in the future".into(),
            ));
        }

        let code = request.code.trim().to_uppercase();
        if code.is_empty() {
            return Err(ServiceError::ValidationError("Coupon code is required".into()));
        }

        let existing = Coupons::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .count(&*self.db_pool)
            .await?;
        if existing > 0 {
            return Err(ServiceError::Conflict("Coupon code already exists".into()));
        }

        if let Some(user_id) = &request.user_id {
            let active = Coupons::find()
                .filter(coupon::Column::UserId.eq(user_id.clone()))
                .filter(coupon::Column::IsActive.eq(true))
                .count(&*self.db_pool)
                .await?;
            if active > 0 {
                return Err(ServiceError::Conflict(
                    "User already has an active coupon".into(),
                ));
            }
        }

        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            discount_percentage: Set(request.discount_percentage),
            expires_at: Set(request.expires_at),
            user_id: Set(request.user_id),
            is_active: Set(true),
            usage_count: Set(0),
            usage_limit: Set(request.usage_limit),
            created_at: Set(now),
            updated_at: Set(None),
        };

        // The unique index on code backstops a concurrent create
        model.insert(&*self.db_pool).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("Coupon code already exists".into())
            } else {
                ServiceError::DatabaseError(e)
            }
        })
    }

    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        coupon_id: Uuid,
        changes: UpdateCoupon,
    ) -> Result<coupon::Model, ServiceError> {
        let coupon = Coupons::find_by_id(coupon_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))?;

        let mut active: coupon::ActiveModel = coupon.into();
        if let Some(pct) = changes.discount_percentage {
            if !(1..=100).contains(&pct) {
                return Err(ServiceError::ValidationError(
                    "Discount percentage must be between 1 and 100".into(),
                ));
            }
            active.discount_percentage = Set(pct);
        }
        if let Some(expires_at) = changes.expires_at {
            active.expires_at = Set(expires_at);
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Some(Utc::now()));

        Ok(active.update(&*self.db_pool).await?)
    }

    #[instrument(skip(self))]
    pub async fn deactivate(&self, coupon_id: Uuid) -> Result<(), ServiceError> {
        let coupon = Coupons::find_by_id(coupon_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))?;

        let mut active: coupon::ActiveModel = coupon.into();
        active.is_active = Set(false);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db_pool).await?;
        Ok(())
    }

    /// Paginated admin listing, newest first.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
        active: Option<bool>,
    ) -> Result<(Vec<coupon::Model>, u64), ServiceError> {
        let mut query = Coupons::find().order_by_desc(coupon::Column::CreatedAt);
        if let Some(active) = active {
            query = query.filter(coupon::Column::IsActive.eq(active));
        }

        let paginator = query.paginate(&*self.db_pool, per_page.clamp(1, 100));
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }
}

/// RWD{6 digits}{2 letters}; collision odds are low and the unique index
/// catches the rest.
fn generate_coupon_code() -> String {
    let mut rng = rand::thread_rng();
    let digits: u32 = rng.gen_range(100_000..1_000_000);
    let letters: String = (0..2)
        .map(|_| (b'A' + rng.gen_range(0..26)) as char)
        .collect();
    format!("RWD{}{}", digits, letters)
}

fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    let text = err.to_string().to_lowercase();
    text.contains("unique") || text.contains("duplicate")
}
