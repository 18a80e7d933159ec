use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Sender half of the in-process event channel.
///
/// Event emission is fire-and-forget: a full or closed channel only
/// produces a warning, never a failure of the emitting operation.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and logs instead of propagating a channel failure.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

// Events emitted by the order, payment and shipment flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Checkout events
    CheckoutSessionCreated {
        gateway_order_id: String,
        total: Decimal,
    },
    CheckoutSessionExpired {
        gateway_order_id: String,
    },

    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),

    // Payment events
    PaymentConfirmed {
        order_id: Uuid,
        gateway_order_id: String,
        amount: Decimal,
    },
    PaymentFailed {
        gateway_order_id: String,
        reason: String,
    },

    // Inventory events
    StockDecremented {
        product_id: Uuid,
        quantity: i32,
        clamped: bool,
    },
    ProductRestocked {
        product_id: Uuid,
        new_stock: i32,
    },

    // Coupon events
    CouponRedeemed {
        code: String,
        user_id: Option<String>,
    },
    RewardCouponIssued {
        code: String,
        user_id: String,
        order_id: Uuid,
    },

    // Shipment events
    ShipmentCreated {
        order_id: Uuid,
        shipment_id: String,
    },
    AwbAssigned {
        order_id: Uuid,
        awb_code: String,
        courier_name: String,
    },
    PickupScheduled {
        order_id: Uuid,
        scheduled_at: DateTime<Utc>,
    },
    ShipmentStatusChanged {
        order_id: Uuid,
        carrier_status: String,
    },
    ShipmentCancelled(Uuid),
}

/// Consumes events from the channel until all senders drop.
///
/// Today the consumer only logs; the channel exists so side effects can
/// move off the request path without changing emitters.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PaymentConfirmed {
                order_id,
                gateway_order_id,
                amount,
            } => {
                info!(
                    order_id = %order_id,
                    gateway_order_id = %gateway_order_id,
                    amount = %amount,
                    "Payment confirmed"
                );
            }
            Event::PaymentFailed {
                gateway_order_id,
                reason,
            } => {
                warn!(
                    gateway_order_id = %gateway_order_id,
                    reason = %reason,
                    "Payment failed"
                );
            }
            Event::StockDecremented {
                product_id,
                quantity,
                clamped,
            } if *clamped => {
                warn!(
                    product_id = %product_id,
                    quantity = quantity,
                    "Stock decrement clamped at zero; oversell occurred"
                );
            }
            other => {
                info!("Event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}
