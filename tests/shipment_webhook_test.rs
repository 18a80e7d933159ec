mod common;

use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;

use common::{checkout_request, TestApp, FAKE_AWB, FAKE_SHIPMENT_ID, FAKE_SHIPMENT_ORDER_ID};
use storefront_api::entities::order::{self, OrderStatus};

/// Runs a full checkout and confirmation so the order carries the fake
/// carrier's shipment identifiers.
async fn paid_order(app: &TestApp) -> order::Model {
    let shirt = app.seed_product("TSH-W", "Cotton Shirt", dec!(1000), 10).await;
    let session = app
        .services
        .checkout
        .create_session(checkout_request(Some("user-1"), vec![(shirt.id, 1)], None))
        .await
        .unwrap();
    app.payment.script_success();
    let order = app
        .services
        .confirmation
        .confirm_payment(&session.gateway_order_id)
        .await
        .unwrap();
    app.services.orders.get(order.id).await.unwrap()
}

#[tokio::test]
async fn webhook_resolves_by_numeric_shipment_id_and_projects_status() {
    let app = TestApp::spawn().await;
    let order = paid_order(&app).await;
    assert_eq!(order.shipment_id.as_deref(), Some(FAKE_SHIPMENT_ID));

    app.services
        .shipments
        .handle_shipment_webhook(serde_json::json!({
            "shipment_id": 880456,
            "current_status": "IN TRANSIT"
        }))
        .await
        .unwrap();

    let updated = app.services.orders.get(order.id).await.unwrap();
    assert_eq!(updated.status, OrderStatus::Shipped);
    assert_eq!(
        updated.current_shipment_status.as_deref(),
        Some("IN TRANSIT")
    );
}

#[tokio::test]
async fn webhook_resolves_by_carrier_order_id() {
    let app = TestApp::spawn().await;
    let order = paid_order(&app).await;

    app.services
        .shipments
        .handle_shipment_webhook(serde_json::json!({
            "order_id": FAKE_SHIPMENT_ORDER_ID,
            "shipment_status": "PICKED UP"
        }))
        .await
        .unwrap();

    let updated = app.services.orders.get(order.id).await.unwrap();
    assert_eq!(updated.status, OrderStatus::Processing);
}

#[tokio::test]
async fn webhook_backfills_a_missing_awb() {
    let app = TestApp::spawn().await;
    let order = paid_order(&app).await;
    assert!(order.awb_code.is_none());

    app.services
        .shipments
        .handle_shipment_webhook(serde_json::json!({
            "shipment_id": FAKE_SHIPMENT_ID,
            "awb": "AWB-LATE-77",
            "current_status": "AWB ASSIGNED"
        }))
        .await
        .unwrap();

    let updated = app.services.orders.get(order.id).await.unwrap();
    assert_eq!(updated.awb_code.as_deref(), Some("AWB-LATE-77"));
    assert_eq!(updated.status, OrderStatus::Processing);
}

#[tokio::test]
async fn webhook_resolves_by_awb_after_assignment() {
    let app = TestApp::spawn().await;
    let order = paid_order(&app).await;

    app.services
        .shipments
        .assign_courier(order.id, None)
        .await
        .unwrap();

    app.services
        .shipments
        .handle_shipment_webhook(serde_json::json!({
            "awb": FAKE_AWB,
            "current_status": "SHIPPED"
        }))
        .await
        .unwrap();

    let updated = app.services.orders.get(order.id).await.unwrap();
    assert_eq!(updated.status, OrderStatus::Shipped);
    assert_eq!(updated.courier_name.as_deref(), Some("Bluedart"));
}

#[tokio::test]
async fn unknown_carrier_status_is_stored_without_a_transition() {
    let app = TestApp::spawn().await;
    let order = paid_order(&app).await;

    app.services
        .shipments
        .handle_shipment_webhook(serde_json::json!({
            "shipment_id": FAKE_SHIPMENT_ID,
            "current_status": "AT WAREHOUSE HUB"
        }))
        .await
        .unwrap();

    let updated = app.services.orders.get(order.id).await.unwrap();
    assert_eq!(updated.status, OrderStatus::Pending);
    assert_eq!(
        updated.current_shipment_status.as_deref(),
        Some("AT WAREHOUSE HUB")
    );
}

#[tokio::test]
async fn delivered_webhook_lands_when_earlier_events_were_missed() {
    let app = TestApp::spawn().await;
    let order = paid_order(&app).await;
    assert_eq!(order.status, OrderStatus::Pending);

    // The carrier's SHIPPED event never arrived; DELIVERED still projects
    app.services
        .shipments
        .handle_shipment_webhook(serde_json::json!({
            "shipment_id": FAKE_SHIPMENT_ID,
            "current_status": "DELIVERED"
        }))
        .await
        .unwrap();

    let updated = app.services.orders.get(order.id).await.unwrap();
    assert_eq!(updated.status, OrderStatus::Delivered);
    assert_eq!(updated.current_shipment_status.as_deref(), Some("DELIVERED"));
}

#[tokio::test]
async fn admin_can_mark_a_processing_order_delivered() {
    let app = TestApp::spawn().await;
    let order = paid_order(&app).await;

    app.services
        .shipments
        .schedule_pickup(order.id)
        .await
        .unwrap();
    let updated = app
        .services
        .orders
        .update_status(order.id, OrderStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(updated.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn webhook_matching_no_order_is_acknowledged() {
    let app = TestApp::spawn().await;
    paid_order(&app).await;

    app.services
        .shipments
        .handle_shipment_webhook(serde_json::json!({
            "shipment_id": "999999",
            "current_status": "IN TRANSIT"
        }))
        .await
        .unwrap();
}

#[tokio::test]
async fn create_shipment_is_idempotent() {
    let app = TestApp::spawn().await;
    let order = paid_order(&app).await;

    // Confirmation already registered the shipment once
    assert_eq!(app.shipping.create_calls.load(Ordering::SeqCst), 1);

    let ids = app
        .services
        .shipments
        .create_shipment(order.id)
        .await
        .unwrap();
    assert!(ids.already_existed);
    assert_eq!(ids.shipment_id, FAKE_SHIPMENT_ID);
    assert_eq!(app.shipping.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn courier_recommendation_uses_the_order_weight() {
    let app = TestApp::spawn().await;
    let kettle = app
        .seed_product_weighing("KTL-1", "Steel Kettle", dec!(1500), 10, dec!(2))
        .await;
    let session = app
        .services
        .checkout
        .create_session(checkout_request(None, vec![(kettle.id, 2)], None))
        .await
        .unwrap();
    app.payment.script_success();
    let order = app
        .services
        .confirmation
        .confirm_payment(&session.gateway_order_id)
        .await
        .unwrap();

    app.services
        .shipments
        .assign_courier(order.id, None)
        .await
        .unwrap();

    let weights = app.shipping.recommend_weights.lock().unwrap().clone();
    assert_eq!(weights, vec![dec!(4)]);
}

#[tokio::test]
async fn pickup_moves_the_order_to_processing() {
    let app = TestApp::spawn().await;
    let order = paid_order(&app).await;

    let updated = app
        .services
        .shipments
        .schedule_pickup(order.id)
        .await
        .unwrap();
    assert_eq!(updated.status, OrderStatus::Processing);
    assert!(updated.pickup_scheduled_at.is_some());
    assert_eq!(app.shipping.pickup_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelling_the_shipment_cancels_the_order() {
    let app = TestApp::spawn().await;
    let order = paid_order(&app).await;

    app.services
        .shipments
        .assign_courier(order.id, Some("24".into()))
        .await
        .unwrap();
    let updated = app
        .services
        .shipments
        .cancel_shipment(order.id)
        .await
        .unwrap();

    assert_eq!(updated.status, OrderStatus::Cancelled);
    assert_eq!(app.shipping.cancel_calls.load(Ordering::SeqCst), 1);

    let refreshed = app.services.orders.get(order.id).await.unwrap();
    assert!(refreshed.shipment_cancelled_at.is_some());
}
