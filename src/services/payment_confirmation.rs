use crate::{
    db::DbPool,
    entities::order,
    entities::pending_checkout::{self, Entity as PendingCheckouts, SnapshotLine},
    errors::ServiceError,
    events::{Event, EventSender},
    mailer::Mailer,
    payment_gateway::{normalize_payment_method, GatewayPaymentStatus, PaymentGateway},
    services::coupons::CouponService,
    services::inventory::InventoryService,
    services::orders::OrderService,
    services::shipments::ShipmentService,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, QueryFilter};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Decoded payment gateway webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentWebhookEvent {
    Success { gateway_order_id: String },
    Failed { gateway_order_id: String },
    UserDropped { gateway_order_id: String },
    Unknown,
}

/// Turns a verified payment into an order exactly once.
#[derive(Clone)]
pub struct PaymentConfirmationService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    orders: OrderService,
    inventory: InventoryService,
    coupons: CouponService,
    shipments: ShipmentService,
    payment_gateway: Arc<dyn PaymentGateway>,
    mailer: Arc<dyn Mailer>,
    reward_threshold: Decimal,
}

impl PaymentConfirmationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        orders: OrderService,
        inventory: InventoryService,
        coupons: CouponService,
        shipments: ShipmentService,
        payment_gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
        reward_threshold: Decimal,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            orders,
            inventory,
            coupons,
            shipments,
            payment_gateway,
            mailer,
            reward_threshold,
        }
    }

    /// Confirms a payment and materializes the order.
    ///
    /// Idempotent at two levels: an existing order short-circuits before
    /// any work, and the unique index on gateway_order_id resolves the
    /// insert race in favor of exactly one caller. Only the inserting
    /// caller runs the side effects (stock decrement, reward coupon, mail,
    /// shipment); all of those except the decrement are best-effort.
    #[instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        gateway_order_id: &str,
    ) -> Result<order::Model, ServiceError> {
        if let Some(existing) = self.orders.get_by_gateway_order_id(gateway_order_id).await? {
            info!(order_id = %existing.id, "Order already confirmed; returning it");
            return Ok(existing);
        }

        let snapshot = PendingCheckouts::find()
            .filter(pending_checkout::Column::GatewayOrderId.eq(gateway_order_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::SessionExpired(gateway_order_id.to_string()))?;

        let payments = self.payment_gateway.fetch_payments(gateway_order_id).await?;
        let successful = payments
            .iter()
            .find(|p| p.status == GatewayPaymentStatus::Success);

        let Some(paid) = successful else {
            let failed = payments
                .iter()
                .any(|p| p.status == GatewayPaymentStatus::Failed);
            let reason = if failed {
                "Payment failed at the gateway"
            } else {
                "Payment not completed yet"
            };
            return Err(ServiceError::PaymentFailed(reason.to_string()));
        };

        let payment_method = normalize_payment_method(paid.payment_group.as_deref());
        let created = self
            .orders
            .create_from_snapshot(
                &snapshot,
                paid.payment_id.clone(),
                Some(payment_method.to_string()),
            )
            .await?;

        if !created.was_inserted() {
            // The racing confirmation owns the side effects
            return Ok(created.into_model());
        }
        let order = created.into_model();

        let lines: Vec<SnapshotLine> = serde_json::from_value(snapshot.line_items.clone())?;
        let decrements: Vec<_> = lines
            .iter()
            .map(|l| (l.product_id, l.quantity))
            .collect();
        self.inventory.commit_decrement(&decrements).await?;

        if let Err(e) = snapshot.clone().delete(&*self.db_pool).await {
            // Harmless leftover; the sweep task will collect it
            warn!("Failed to delete consumed checkout snapshot: {}", e);
        }

        self.run_post_confirmation(&order).await;

        self.event_sender
            .send_or_log(Event::PaymentConfirmed {
                order_id: order.id,
                gateway_order_id: gateway_order_id.to_string(),
                amount: order.total_amount,
            })
            .await;

        info!(order_id = %order.id, total = %order.total_amount, "Payment confirmed");
        Ok(order)
    }

    /// Best-effort follow-ups after the order exists. None of these may
    /// fail the confirmation; the customer has paid.
    async fn run_post_confirmation(&self, order: &order::Model) {
        if order.total_amount >= self.reward_threshold {
            if let Some(user_id) = &order.user_id {
                match self.coupons.issue_reward_coupon(user_id, order.id).await {
                    Ok(coupon) => {
                        let context = serde_json::json!({
                            "coupon_code": coupon.code,
                            "discount_percentage": coupon.discount_percentage,
                            "expires_at": coupon.expires_at.to_rfc3339(),
                            "order_number": order.order_number,
                        });
                        if let Err(e) = self
                            .mailer
                            .send(&order.customer_email, "reward-coupon", context)
                            .await
                        {
                            warn!("Reward coupon mail failed: {}", e);
                        }
                    }
                    Err(e) => error!("Reward coupon issue failed: {}", e),
                }
            }
        }

        let context = serde_json::json!({
            "order_number": order.order_number,
            "customer_name": order.customer_name,
            "total_amount": order.total_amount,
        });
        if let Err(e) = self
            .mailer
            .send(&order.customer_email, "order-confirmation", context)
            .await
        {
            warn!("Order confirmation mail failed: {}", e);
        }

        if let Err(e) = self.shipments.create_shipment(order.id).await {
            error!(order_id = %order.id, "Shipment creation failed: {}", e);
        }
    }

    /// Applies a decoded gateway webhook. Success routes through the same
    /// confirmation path the client poll uses; failures cancel the order
    /// if one exists.
    #[instrument(skip(self))]
    pub async fn handle_webhook_event(
        &self,
        event: PaymentWebhookEvent,
    ) -> Result<(), ServiceError> {
        match event {
            PaymentWebhookEvent::Success { gateway_order_id } => {
                self.confirm_payment(&gateway_order_id).await?;
                Ok(())
            }
            PaymentWebhookEvent::Failed { gateway_order_id }
            | PaymentWebhookEvent::UserDropped { gateway_order_id } => {
                self.orders.mark_payment_failed(&gateway_order_id).await?;
                self.event_sender
                    .send_or_log(Event::PaymentFailed {
                        gateway_order_id,
                        reason: "Gateway reported failure".into(),
                    })
                    .await;
                Ok(())
            }
            PaymentWebhookEvent::Unknown => Ok(()),
        }
    }
}

/// Decodes the gateway webhook body. Unknown shapes decode to `Unknown`
/// and are acknowledged without processing.
pub fn parse_payment_webhook(payload: &serde_json::Value) -> PaymentWebhookEvent {
    let webhook_type = payload.get("type").and_then(|v| v.as_str());
    let gateway_order_id = payload
        .pointer("/data/order/order_id")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    match (webhook_type, gateway_order_id) {
        (Some("PAYMENT_SUCCESS_WEBHOOK"), Some(id)) => PaymentWebhookEvent::Success {
            gateway_order_id: id,
        },
        (Some("PAYMENT_FAILED_WEBHOOK"), Some(id)) => PaymentWebhookEvent::Failed {
            gateway_order_id: id,
        },
        (Some("PAYMENT_USER_DROPPED_WEBHOOK"), Some(id)) => PaymentWebhookEvent::UserDropped {
            gateway_order_id: id,
        },
        _ => PaymentWebhookEvent::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_webhook() {
        let payload = serde_json::json!({
            "type": "PAYMENT_SUCCESS_WEBHOOK",
            "data": {"order": {"order_id": "ORD_1700000000000_AAA111BBB"}}
        });
        assert_eq!(
            parse_payment_webhook(&payload),
            PaymentWebhookEvent::Success {
                gateway_order_id: "ORD_1700000000000_AAA111BBB".into()
            }
        );
    }

    #[test]
    fn parses_failed_and_dropped_webhooks() {
        let failed = serde_json::json!({
            "type": "PAYMENT_FAILED_WEBHOOK",
            "data": {"order": {"order_id": "ORD_1"}}
        });
        assert!(matches!(
            parse_payment_webhook(&failed),
            PaymentWebhookEvent::Failed { .. }
        ));

        let dropped = serde_json::json!({
            "type": "PAYMENT_USER_DROPPED_WEBHOOK",
            "data": {"order": {"order_id": "ORD_1"}}
        });
        assert!(matches!(
            parse_payment_webhook(&dropped),
            PaymentWebhookEvent::UserDropped { .. }
        ));
    }

    #[test]
    fn unknown_shapes_are_tolerated() {
        assert_eq!(
            parse_payment_webhook(&serde_json::json!({"type": "SETTLEMENT_WEBHOOK"})),
            PaymentWebhookEvent::Unknown
        );
        assert_eq!(
            parse_payment_webhook(&serde_json::json!({})),
            PaymentWebhookEvent::Unknown
        );
        // Right type but no order id
        assert_eq!(
            parse_payment_webhook(&serde_json::json!({"type": "PAYMENT_SUCCESS_WEBHOOK"})),
            PaymentWebhookEvent::Unknown
        );
    }
}
