use crate::{
    db::DbPool,
    entities::order::{self, Entity as Orders, OrderStatus},
    entities::order_item,
    entities::product::Entity as Products,
    errors::ServiceError,
    events::{Event, EventSender},
    services::checkout::CheckoutAddress,
    services::orders::OrderService,
    shipping_gateway::{
        CarrierAddress, CarrierOrderItem, CreateCarrierOrder, ShippingGateway, TrackingInfo,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Carriers bill at least half a kilogram per unit.
const MIN_UNIT_WEIGHT_KG: Decimal = dec!(0.5);
const PARCEL_DIMENSION_CM: u32 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentIds {
    pub shipment_order_id: String,
    pub shipment_id: String,
    pub already_existed: bool,
}

/// Orchestrates the carrier integration for paid orders.
#[derive(Clone)]
pub struct ShipmentService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    orders: OrderService,
    gateway: Option<Arc<dyn ShippingGateway>>,
}

impl ShipmentService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        orders: OrderService,
        gateway: Option<Arc<dyn ShippingGateway>>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            orders,
            gateway,
        }
    }

    fn gateway(&self) -> Result<&Arc<dyn ShippingGateway>, ServiceError> {
        self.gateway.as_ref().ok_or_else(|| {
            ServiceError::ExternalServiceError("Shipping gateway is not configured".into())
        })
    }

    /// Total billable weight of an order's items.
    async fn order_weight_kg(
        &self,
        items: &[order_item::Model],
    ) -> Result<Decimal, ServiceError> {
        let mut weight = Decimal::ZERO;
        for item in items {
            let product = Products::find_by_id(item.product_id)
                .one(&*self.db_pool)
                .await?;
            let unit_weight = product.and_then(|p| p.weight_kg);
            weight += billable_unit_weight(unit_weight) * Decimal::from(item.quantity);
        }
        Ok(weight)
    }

    /// Registers the order with the carrier. Idempotent: if the order
    /// already carries shipment identifiers, those are returned without a
    /// second carrier call.
    #[instrument(skip(self))]
    pub async fn create_shipment(&self, order_id: Uuid) -> Result<ShipmentIds, ServiceError> {
        let (order, items) = self.orders.get_with_items(order_id).await?;

        if let (Some(shipment_order_id), Some(shipment_id)) =
            (order.shipment_order_id.clone(), order.shipment_id.clone())
        {
            return Ok(ShipmentIds {
                shipment_order_id,
                shipment_id,
                already_existed: true,
            });
        }

        let gateway = self.gateway()?;
        let address: CheckoutAddress = serde_json::from_value(order.shipping_address.clone())?;
        let carrier_address = to_carrier_address(&address);

        let mut carrier_items = Vec::with_capacity(items.len());
        let mut weight = Decimal::ZERO;
        for item in &items {
            let product = Products::find_by_id(item.product_id)
                .one(&*self.db_pool)
                .await?;
            let (sku, hsn, unit_weight) = match product {
                Some(p) => (p.sku, p.hsn_code, p.weight_kg),
                None => (item.product_id.to_string(), None, None),
            };
            weight += billable_unit_weight(unit_weight) * Decimal::from(item.quantity);
            carrier_items.push(CarrierOrderItem {
                name: item.name.clone(),
                sku,
                units: item.quantity as u32,
                selling_price: item.unit_price,
                hsn,
            });
        }

        let request = CreateCarrierOrder {
            order_number: order.order_number.clone(),
            order_date: order.created_at,
            customer_email: order.customer_email.clone(),
            billing_address: carrier_address.clone(),
            shipping_address: carrier_address,
            items: carrier_items,
            payment_method: "Prepaid".into(),
            subtotal: order.subtotal,
            discount: order.discount,
            shipping_charges: order.shipping_fee,
            weight_kg: weight,
            length_cm: PARCEL_DIMENSION_CM,
            breadth_cm: PARCEL_DIMENSION_CM,
            height_cm: PARCEL_DIMENSION_CM,
        };

        let created = gateway.create_order(&request).await?;

        let mut active: order::ActiveModel = order.into();
        active.shipment_order_id = Set(Some(created.shipment_order_id.clone()));
        active.shipment_id = Set(Some(created.shipment_id.clone()));
        active.current_shipment_status = Set(created.status.clone());
        active.shipment_created_at = Set(Some(Utc::now()));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db_pool).await?;

        info!(
            order_id = %order_id,
            shipment_id = %created.shipment_id,
            "Shipment registered with carrier"
        );
        self.event_sender
            .send_or_log(Event::ShipmentCreated {
                order_id,
                shipment_id: created.shipment_id.clone(),
            })
            .await;

        Ok(ShipmentIds {
            shipment_order_id: created.shipment_order_id,
            shipment_id: created.shipment_id,
            already_existed: false,
        })
    }

    /// Assigns an AWB. Without an explicit courier the carrier's cheapest
    /// serviceable option for the delivery pincode is used.
    #[instrument(skip(self))]
    pub async fn assign_courier(
        &self,
        order_id: Uuid,
        courier_id: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let (order, items) = self.orders.get_with_items(order_id).await?;
        let gateway = self.gateway()?;

        let shipment_id = order.shipment_id.clone().ok_or_else(|| {
            ServiceError::InvalidOperation("Order has no shipment registered yet".into())
        })?;

        let chosen = match courier_id {
            Some(id) => Some(id),
            None => {
                let address: CheckoutAddress =
                    serde_json::from_value(order.shipping_address.clone())?;
                let weight = self.order_weight_kg(&items).await?;
                let options = gateway
                    .recommend_courier(&address.pincode, weight)
                    .await?;
                options.first().map(|o| o.courier_id.clone())
            }
        };

        let assignment = gateway
            .assign_courier(&shipment_id, chosen.as_deref())
            .await?;

        let mut active: order::ActiveModel = order.into();
        active.awb_code = Set(Some(assignment.awb_code.clone()));
        active.courier_id = Set(assignment.courier_id.clone());
        active.courier_name = Set(assignment.courier_name.clone());
        active.awb_assigned_at = Set(Some(Utc::now()));
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db_pool).await?;

        info!(order_id = %order_id, awb = %assignment.awb_code, "AWB assigned");
        self.event_sender
            .send_or_log(Event::AwbAssigned {
                order_id,
                awb_code: assignment.awb_code,
                courier_name: assignment.courier_name.unwrap_or_default(),
            })
            .await;

        Ok(updated)
    }

    /// Requests carrier pickup and moves the order to processing.
    #[instrument(skip(self))]
    pub async fn schedule_pickup(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let order = self.orders.get(order_id).await?;
        let gateway = self.gateway()?;

        let shipment_id = order.shipment_id.clone().ok_or_else(|| {
            ServiceError::InvalidOperation("Order has no shipment registered yet".into())
        })?;

        gateway.schedule_pickup(&shipment_id).await?;

        let now = Utc::now();
        let mut active: order::ActiveModel = order.into();
        active.pickup_scheduled_at = Set(Some(now));
        active.updated_at = Set(Some(now));
        active.update(&*self.db_pool).await?;

        self.event_sender
            .send_or_log(Event::PickupScheduled {
                order_id,
                scheduled_at: now,
            })
            .await;

        self.orders
            .update_status(order_id, OrderStatus::Processing)
            .await
    }

    #[instrument(skip(self))]
    pub async fn track_shipment(&self, order_id: Uuid) -> Result<TrackingInfo, ServiceError> {
        let order = self.orders.get(order_id).await?;
        let gateway = self.gateway()?;

        let shipment_id = order.shipment_id.ok_or_else(|| {
            ServiceError::InvalidOperation("Order has no shipment registered yet".into())
        })?;

        gateway.track(&shipment_id).await
    }

    /// Cancels the shipment at the carrier and the order with it.
    #[instrument(skip(self))]
    pub async fn cancel_shipment(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let order = self.orders.get(order_id).await?;
        let gateway = self.gateway()?;

        let awb = order.awb_code.clone().ok_or_else(|| {
            ServiceError::InvalidOperation("Order has no AWB assigned".into())
        })?;

        gateway.cancel(&awb).await?;

        let mut active: order::ActiveModel = order.into();
        active.shipment_cancelled_at = Set(Some(Utc::now()));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db_pool).await?;

        self.event_sender
            .send_or_log(Event::ShipmentCancelled(order_id))
            .await;

        self.orders
            .update_status(order_id, OrderStatus::Cancelled)
            .await
    }

    /// Applies a carrier webhook. The order is resolved by shipment id,
    /// then carrier order id, then AWB; a payload matching nothing is
    /// logged and dropped, never an error back to the carrier.
    #[instrument(skip(self, payload))]
    pub async fn handle_shipment_webhook(
        &self,
        payload: serde_json::Value,
    ) -> Result<(), ServiceError> {
        let shipment_id = string_field(&payload, "shipment_id");
        let carrier_order_id = string_field(&payload, "order_id");
        let awb = string_field(&payload, "awb");

        let carrier_status = string_field(&payload, "current_status")
            .or_else(|| string_field(&payload, "shipment_status"))
            .or_else(|| string_field(&payload, "status"));

        let Some(carrier_status) = carrier_status else {
            warn!("Shipment webhook without a status field; ignoring");
            return Ok(());
        };

        let mut order: Option<order::Model> = None;
        if let Some(id) = &shipment_id {
            order = Orders::find()
                .filter(order::Column::ShipmentId.eq(id.clone()))
                .one(&*self.db_pool)
                .await?;
        }
        if order.is_none() {
            if let Some(id) = &carrier_order_id {
                order = Orders::find()
                    .filter(order::Column::ShipmentOrderId.eq(id.clone()))
                    .one(&*self.db_pool)
                    .await?;
            }
        }
        if order.is_none() {
            if let Some(code) = &awb {
                order = Orders::find()
                    .filter(order::Column::AwbCode.eq(code.clone()))
                    .one(&*self.db_pool)
                    .await?;
            }
        }

        let Some(order) = order else {
            warn!(
                shipment_id = ?shipment_id,
                carrier_order_id = ?carrier_order_id,
                awb = ?awb,
                "Shipment webhook matched no order"
            );
            return Ok(());
        };

        // Backfill the AWB if the webhook carries one we have not stored
        let order = if order.awb_code.is_none() && awb.is_some() {
            let mut active: order::ActiveModel = order.into();
            active.awb_code = Set(awb);
            active.update(&*self.db_pool).await?
        } else {
            order
        };

        self.orders
            .apply_shipment_status(order, &carrier_status)
            .await?;
        Ok(())
    }
}

fn billable_unit_weight(weight_kg: Option<Decimal>) -> Decimal {
    weight_kg.unwrap_or(MIN_UNIT_WEIGHT_KG).max(MIN_UNIT_WEIGHT_KG)
}

fn to_carrier_address(address: &CheckoutAddress) -> CarrierAddress {
    CarrierAddress {
        full_name: address.full_name.clone(),
        address_line1: address.address_line1.clone(),
        address_line2: address.address_line2.clone(),
        city: address.city.clone(),
        state: address.state.clone(),
        country: address.country.clone(),
        pincode: address.pincode.clone(),
        phone: address.phone.clone(),
    }
}

/// Carrier webhooks mix numbers and strings for the same field across
/// events.
fn string_field(payload: &serde_json::Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_weight_floors_at_half_a_kilogram() {
        assert_eq!(billable_unit_weight(None), dec!(0.5));
        assert_eq!(billable_unit_weight(Some(dec!(0.2))), dec!(0.5));
        assert_eq!(billable_unit_weight(Some(dec!(2))), dec!(2));
    }

    #[test]
    fn string_field_accepts_numbers_and_strings() {
        let payload = serde_json::json!({
            "shipment_id": 42,
            "awb": "AWB9",
            "order_id": "",
            "extra": null
        });
        assert_eq!(string_field(&payload, "shipment_id").as_deref(), Some("42"));
        assert_eq!(string_field(&payload, "awb").as_deref(), Some("AWB9"));
        assert_eq!(string_field(&payload, "order_id"), None);
        assert_eq!(string_field(&payload, "extra"), None);
        assert_eq!(string_field(&payload, "missing"), None);
    }
}
