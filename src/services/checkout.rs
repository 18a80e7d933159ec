use crate::{
    db::DbPool,
    entities::pending_checkout::{self, Entity as PendingCheckouts, SnapshotLine},
    errors::ServiceError,
    events::{Event, EventSender},
    payment_gateway::{CreateGatewayOrder, PaymentGateway},
    services::coupons::{round_money, CouponService},
    services::inventory::{InventoryService, RequestedLine},
};
use chrono::{Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Pricing policy applied to every checkout.
#[derive(Debug, Clone)]
pub struct CheckoutPolicy {
    /// Subtotal strictly above this ships free.
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_fee: Decimal,
    pub tax_rate: Decimal,
    pub max_line_quantity: u32,
    pub currency: String,
    pub return_url: String,
    pub notify_url: String,
    pub session_ttl: Duration,
}

/// Client-supplied delivery address, validated before it is frozen into the
/// checkout snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct CheckoutAddress {
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(length(min = 1, max = 200))]
    pub address_line1: String,
    #[validate(length(max = 200))]
    pub address_line2: Option<String>,
    #[validate(length(min = 1, max = 80))]
    pub city: String,
    #[validate(length(min = 1, max = 80))]
    pub state: String,
    #[validate(length(min = 1, max = 80))]
    pub country: String,
    #[validate(length(min = 4, max = 10))]
    pub pincode: String,
    #[validate(length(min = 8, max = 15))]
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct CheckoutLineRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
pub struct CheckoutRequest {
    pub user_id: Option<String>,
    #[validate(length(min = 1, max = 120))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    #[validate(length(min = 8, max = 15))]
    pub customer_phone: String,
    #[validate(length(min = 1))]
    pub items: Vec<CheckoutLineRequest>,
    pub coupon_code: Option<String>,
    #[validate]
    pub shipping_address: CheckoutAddress,
}

/// What the storefront needs to launch the gateway's payment UI.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub payment_session_id: String,
    pub gateway_order_id: String,
    pub order_amount: Decimal,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
}

#[derive(Clone)]
pub struct CheckoutService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    inventory: InventoryService,
    coupons: CouponService,
    payment_gateway: Arc<dyn PaymentGateway>,
    policy: CheckoutPolicy,
}

impl CheckoutService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        inventory: InventoryService,
        coupons: CouponService,
        payment_gateway: Arc<dyn PaymentGateway>,
        policy: CheckoutPolicy,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            inventory,
            coupons,
            payment_gateway,
            policy,
        }
    }

    /// Prices the cart, opens a gateway order and persists the pending
    /// snapshot the confirmation path will later consume.
    ///
    /// The coupon redemption happens before the gateway call; an abandoned
    /// payment therefore still burns the use. Accepted trade-off, matching
    /// the refusal to roll back money-side effects on foreign failures.
    #[instrument(skip(self, request), fields(user_id = ?request.user_id))]
    pub async fn create_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        request.validate()?;

        for line in &request.items {
            if line.quantity == 0 || line.quantity > self.policy.max_line_quantity {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for product {} must be between 1 and {}",
                    line.product_id, self.policy.max_line_quantity
                )));
            }
        }

        let requested: Vec<RequestedLine> = request
            .items
            .iter()
            .map(|l| RequestedLine {
                product_id: l.product_id,
                quantity: l.quantity,
            })
            .collect();
        let priced = self.inventory.reserve_and_price_all(&requested).await?;

        let subtotal: Decimal = priced
            .iter()
            .map(|line| line.unit_price * Decimal::from(line.quantity))
            .sum();

        let shipping_fee = if subtotal > self.policy.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.policy.flat_shipping_fee
        };
        let tax = round_money(subtotal * self.policy.tax_rate);

        let mut discount = Decimal::ZERO;
        let mut applied_coupon = None;
        if let Some(code) = request
            .coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            let validated = self
                .coupons
                .validate(code, request.user_id.as_deref())
                .await?;
            discount = self
                .coupons
                .apply_to_total(validated.discount_percentage, subtotal);
            self.coupons
                .redeem(&validated.code, request.user_id.as_deref())
                .await?;
            applied_coupon = Some(validated.code);
        }

        let total = subtotal + shipping_fee + tax - discount;
        if total <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Order total must be positive".into(),
            ));
        }

        let gateway_order_id = generate_gateway_order_id();

        let session = self
            .payment_gateway
            .create_order(&CreateGatewayOrder {
                gateway_order_id: gateway_order_id.clone(),
                amount: total,
                currency: self.policy.currency.clone(),
                customer_id: request
                    .user_id
                    .clone()
                    .unwrap_or_else(|| format!("guest_{}", Uuid::new_v4().simple())),
                customer_name: request.customer_name.clone(),
                customer_email: request.customer_email.clone(),
                customer_phone: request.customer_phone.clone(),
                return_url: self.policy.return_url.clone(),
                notify_url: self.policy.notify_url.clone(),
            })
            .await?;

        let snapshot_lines: Vec<SnapshotLine> = priced
            .iter()
            .map(|line| SnapshotLine {
                product_id: line.product_id,
                name: line.name.clone(),
                unit_price: line.unit_price,
                quantity: line.quantity,
            })
            .collect();

        let model = pending_checkout::ActiveModel {
            id: Set(Uuid::new_v4()),
            gateway_order_id: Set(session.gateway_order_id.clone()),
            user_id: Set(request.user_id),
            customer_name: Set(request.customer_name),
            customer_email: Set(request.customer_email),
            customer_phone: Set(request.customer_phone),
            line_items: Set(serde_json::to_value(&snapshot_lines)?),
            subtotal: Set(subtotal),
            shipping_fee: Set(shipping_fee),
            tax: Set(tax),
            discount: Set(discount),
            total: Set(total),
            coupon_code: Set(applied_coupon),
            shipping_address: Set(serde_json::to_value(&request.shipping_address)?),
            created_at: Set(Utc::now()),
        };
        model.insert(&*self.db_pool).await?;

        info!(
            gateway_order_id = %session.gateway_order_id,
            total = %total,
            "Checkout session created"
        );
        self.event_sender
            .send_or_log(Event::CheckoutSessionCreated {
                gateway_order_id: session.gateway_order_id.clone(),
                total,
            })
            .await;

        Ok(CheckoutSession {
            payment_session_id: session.payment_session_id,
            gateway_order_id: session.gateway_order_id,
            order_amount: total,
            subtotal,
            shipping_fee,
            tax,
            discount,
        })
    }

    /// Deletes pending checkouts older than the session TTL. Runs from a
    /// periodic task; failures are logged by the caller and retried on the
    /// next tick.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - self.policy.session_ttl;

        let expired = PendingCheckouts::find()
            .filter(pending_checkout::Column::CreatedAt.lt(cutoff))
            .all(&*self.db_pool)
            .await?;
        if expired.is_empty() {
            return Ok(0);
        }

        let result = PendingCheckouts::delete_many()
            .filter(pending_checkout::Column::CreatedAt.lt(cutoff))
            .exec(&*self.db_pool)
            .await?;

        for session in &expired {
            warn!(
                gateway_order_id = %session.gateway_order_id,
                "Pending checkout expired unconfirmed"
            );
            self.event_sender
                .send_or_log(Event::CheckoutSessionExpired {
                    gateway_order_id: session.gateway_order_id.clone(),
                })
                .await;
        }

        Ok(result.rows_affected)
    }
}

/// ORD_{unix_millis}_{9 uppercase alphanumerics}. Collisions would need two
/// ids in the same millisecond with the same random suffix.
fn generate_gateway_order_id() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("ORD_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_order_ids_are_well_formed() {
        let id = generate_gateway_order_id();
        let parts: Vec<&str> = id.splitn(3, '_').collect();
        assert_eq!(parts[0], "ORD");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn gateway_order_ids_do_not_repeat() {
        let a = generate_gateway_order_id();
        let b = generate_gateway_order_id();
        assert_ne!(a, b);
    }
}
