use crate::{
    db::DbPool,
    entities::order::{self, Entity as Orders, OrderStatus, PaymentStatus},
    entities::order_item::{self, Entity as OrderItems},
    entities::pending_checkout::{self, SnapshotLine},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Service owning order records and their status transitions.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    currency: String,
}

/// Outcome of creating an order from a checkout snapshot.
pub enum CreatedOrder {
    /// This call inserted the order.
    Inserted(order::Model),
    /// A concurrent confirmation won the insert race; this is its order.
    AlreadyExists(order::Model),
}

impl CreatedOrder {
    pub fn into_model(self) -> order::Model {
        match self {
            CreatedOrder::Inserted(m) | CreatedOrder::AlreadyExists(m) => m,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, CreatedOrder::Inserted(_))
    }
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, currency: String) -> Self {
        Self {
            db_pool,
            event_sender,
            currency,
        }
    }

    /// Materializes an order (and its items) from a pending checkout
    /// snapshot. The unique index on gateway_order_id is the final defense
    /// against a double confirmation: a unique violation means another call
    /// already created the order, which is then re-read and returned.
    #[instrument(skip(self, snapshot), fields(gateway_order_id = %snapshot.gateway_order_id))]
    pub async fn create_from_snapshot(
        &self,
        snapshot: &pending_checkout::Model,
        gateway_payment_id: Option<String>,
        payment_method: Option<String>,
    ) -> Result<CreatedOrder, ServiceError> {
        let lines: Vec<SnapshotLine> = serde_json::from_value(snapshot.line_items.clone())?;
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(snapshot.gateway_order_id.clone()),
            user_id: Set(snapshot.user_id.clone()),
            customer_name: Set(snapshot.customer_name.clone()),
            customer_email: Set(snapshot.customer_email.clone()),
            customer_phone: Set(snapshot.customer_phone.clone()),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Paid),
            subtotal: Set(snapshot.subtotal),
            discount: Set(snapshot.discount),
            shipping_fee: Set(snapshot.shipping_fee),
            tax: Set(snapshot.tax),
            total_amount: Set(snapshot.total),
            currency: Set(self.currency.clone()),
            coupon_code: Set(snapshot.coupon_code.clone()),
            shipping_address: Set(snapshot.shipping_address.clone()),
            gateway_order_id: Set(Some(snapshot.gateway_order_id.clone())),
            gateway_payment_id: Set(gateway_payment_id),
            payment_method: Set(payment_method),
            shipment_order_id: Set(None),
            shipment_id: Set(None),
            awb_code: Set(None),
            courier_id: Set(None),
            courier_name: Set(None),
            current_shipment_status: Set(None),
            awb_assigned_at: Set(None),
            pickup_scheduled_at: Set(None),
            shipment_created_at: Set(None),
            shipment_cancelled_at: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(1),
        };

        let txn = self.db_pool.begin().await?;
        let insert_result = order_model.insert(&txn).await;

        match insert_result {
            Ok(created) => {
                for line in &lines {
                    let item = order_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        order_id: Set(order_id),
                        product_id: Set(line.product_id),
                        name: Set(line.name.clone()),
                        quantity: Set(line.quantity as i32),
                        unit_price: Set(line.unit_price),
                        created_at: Set(now),
                    };
                    item.insert(&txn).await?;
                }
                txn.commit().await?;

                info!(order_id = %created.id, "Order created");
                self.event_sender
                    .send_or_log(Event::OrderCreated(created.id))
                    .await;
                Ok(CreatedOrder::Inserted(created))
            }
            Err(e) if is_unique_violation(&e) => {
                txn.rollback().await?;
                warn!("Concurrent confirmation already created this order");
                let winner = self
                    .get_by_gateway_order_id(&snapshot.gateway_order_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(
                            "Unique violation but no existing order found".into(),
                        )
                    })?;
                Ok(CreatedOrder::AlreadyExists(winner))
            }
            Err(e) => {
                txn.rollback().await?;
                Err(ServiceError::DatabaseError(e))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Orders::find_by_id(order_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    #[instrument(skip(self))]
    pub async fn get_with_items(
        &self,
        order_id: Uuid,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let order = self.get(order_id).await?;
        let items = OrderItems::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db_pool)
            .await?;
        Ok((order, items))
    }

    pub async fn get_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(Orders::find()
            .filter(order::Column::GatewayOrderId.eq(gateway_order_id))
            .one(&*self.db_pool)
            .await?)
    }

    /// Paginated listing, newest first, optionally scoped to a user or
    /// status.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
        user_id: Option<&str>,
        status: Option<OrderStatus>,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let mut query = Orders::find().order_by_desc(order::Column::CreatedAt);
        if let Some(user_id) = user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let paginator = query.paginate(&*self.db_pool, per_page.clamp(1, 100));
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    /// Moves an order to a new status, enforcing the transition table.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let current = self.get(order_id).await?;
        let old_status = current.status;

        if old_status == next {
            return Ok(current);
        }
        if !old_status.can_transition_to(next) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot move order from {:?} to {:?}",
                old_status, next
            )));
        }

        let version = current.version;
        let mut active: order::ActiveModel = current.into();
        active.status = Set(next);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        let updated = active.update(&*self.db_pool).await?;

        info!(order_id = %order_id, from = ?old_status, to = ?next, "Order status changed");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: format!("{:?}", old_status),
                new_status: format!("{:?}", next),
            })
            .await;
        if next == OrderStatus::Cancelled {
            self.event_sender
                .send_or_log(Event::OrderCancelled(order_id))
                .await;
        }

        Ok(updated)
    }

    pub async fn cancel(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.update_status(order_id, OrderStatus::Cancelled).await
    }

    /// Marks an order's payment as failed and cancels it. Payment failure
    /// trumps the transition table; the gateway has the final word on money.
    #[instrument(skip(self))]
    pub async fn mark_payment_failed(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        let Some(order) = self.get_by_gateway_order_id(gateway_order_id).await? else {
            return Ok(None);
        };

        let order_id = order.id;
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.payment_status = Set(PaymentStatus::Failed);
        active.status = Set(OrderStatus::Cancelled);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        let updated = active.update(&*self.db_pool).await?;

        warn!(order_id = %order_id, "Order cancelled after payment failure");
        self.event_sender
            .send_or_log(Event::OrderCancelled(order_id))
            .await;
        Ok(Some(updated))
    }

    /// Applies a carrier status update: stores the text verbatim and, when
    /// the status is one we project, advances the order accordingly.
    /// Unknown carrier statuses never force a transition.
    #[instrument(skip(self, order))]
    pub async fn apply_shipment_status(
        &self,
        order: order::Model,
        carrier_status: &str,
    ) -> Result<order::Model, ServiceError> {
        let order_id = order.id;
        let old_status = order.status;
        let projected = project_carrier_status(carrier_status);

        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.current_shipment_status = Set(Some(carrier_status.to_string()));
        if let Some(next) = projected {
            if old_status.can_transition_to(next) {
                active.status = Set(next);
            } else {
                warn!(
                    order_id = %order_id,
                    carrier_status = carrier_status,
                    "Projected transition {:?} -> {:?} not allowed; keeping status",
                    old_status,
                    next
                );
            }
        }
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        let updated = active.update(&*self.db_pool).await?;

        self.event_sender
            .send_or_log(Event::ShipmentStatusChanged {
                order_id,
                carrier_status: carrier_status.to_string(),
            })
            .await;

        Ok(updated)
    }
}

/// Carrier status text to order status. Case-insensitive; anything not in
/// the table projects to nothing.
pub fn project_carrier_status(carrier_status: &str) -> Option<OrderStatus> {
    match carrier_status.trim().to_uppercase().as_str() {
        "PICKUP SCHEDULED" | "PICKUP QUEUED" | "AWB ASSIGNED" | "MANIFESTED" | "PICKED UP"
        | "SHIPMENT PICKED UP" => Some(OrderStatus::Processing),
        "SHIPPED" | "IN TRANSIT" | "SHIPMENT OUT FOR DELIVERY" | "OUT FOR DELIVERY" => {
            Some(OrderStatus::Shipped)
        }
        "DELIVERED" | "SHIPMENT DELIVERED" => Some(OrderStatus::Delivered),
        "RTO INITIATED" | "RTO DELIVERED" | "CANCELLED" | "LOST" => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    let text = err.to_string().to_lowercase();
    text.contains("unique") || text.contains("duplicate")
}
