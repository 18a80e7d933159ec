mod common;

use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use std::sync::atomic::Ordering;

use common::{checkout_request, TestApp, FAKE_SHIPMENT_ID};
use storefront_api::{
    entities::order::{OrderStatus, PaymentStatus},
    entities::pending_checkout::Entity as PendingCheckouts,
    entities::product::Entity as Products,
    errors::ServiceError,
    services::payment_confirmation::PaymentWebhookEvent,
};

#[tokio::test]
async fn confirmed_payment_creates_order_and_decrements_stock() {
    let app = TestApp::spawn().await;
    let shirt = app.seed_product("TSH-1", "Cotton Shirt", dec!(1000), 5).await;

    let session = app
        .services
        .checkout
        .create_session(checkout_request(Some("user-1"), vec![(shirt.id, 2)], None))
        .await
        .unwrap();

    app.payment.script_success();
    let order = app
        .services
        .confirmation
        .confirm_payment(&session.gateway_order_id)
        .await
        .unwrap();

    assert_eq!(order.total_amount, dec!(2459));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.payment_method.as_deref(), Some("upi"));
    assert_eq!(order.gateway_payment_id.as_deref(), Some("CF123456"));
    assert_eq!(order.currency, "INR");

    let product = Products::find_by_id(shirt.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 3);
    assert_eq!(product.sold_count, 2);
    assert!(product.is_available);

    // Snapshot is consumed and the shipment registered
    assert!(PendingCheckouts::find()
        .all(&*app.db)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(app.shipping.create_calls.load(Ordering::SeqCst), 1);
    let refreshed = app.services.orders.get(order.id).await.unwrap();
    assert_eq!(refreshed.shipment_id.as_deref(), Some(FAKE_SHIPMENT_ID));
}

#[tokio::test]
async fn double_confirmation_creates_one_order_and_one_decrement() {
    let app = TestApp::spawn().await;
    let shirt = app.seed_product("TSH-2", "Linen Shirt", dec!(1000), 5).await;

    let session = app
        .services
        .checkout
        .create_session(checkout_request(Some("user-1"), vec![(shirt.id, 1)], None))
        .await
        .unwrap();

    app.payment.script_success();
    let first = app
        .services
        .confirmation
        .confirm_payment(&session.gateway_order_id)
        .await
        .unwrap();
    let second = app
        .services
        .confirmation
        .confirm_payment(&session.gateway_order_id)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);

    let product = Products::find_by_id(shirt.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 4);
    assert_eq!(product.sold_count, 1);

    // The second call short-circuits before the gateway and the carrier
    assert_eq!(app.payment.fetch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.shipping.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_gateway_order_reports_session_expired() {
    let app = TestApp::spawn().await;

    let err = app
        .services
        .confirmation
        .confirm_payment("ORD_1700000000000_MISSING99")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SessionExpired(_)));
}

#[tokio::test]
async fn failed_payment_does_not_create_an_order() {
    let app = TestApp::spawn().await;
    let shirt = app.seed_product("TSH-3", "Plain Tee", dec!(800), 5).await;

    let session = app
        .services
        .checkout
        .create_session(checkout_request(None, vec![(shirt.id, 1)], None))
        .await
        .unwrap();

    app.payment.script_failure();
    let err = app
        .services
        .confirmation
        .confirm_payment(&session.gateway_order_id)
        .await
        .unwrap_err();
    match err {
        ServiceError::PaymentFailed(reason) => assert!(reason.contains("failed at the gateway")),
        other => panic!("expected PaymentFailed, got {:?}", other),
    }

    assert!(app
        .services
        .orders
        .get_by_gateway_order_id(&session.gateway_order_id)
        .await
        .unwrap()
        .is_none());
    let product = Products::find_by_id(shirt.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 5);
}

#[tokio::test]
async fn pending_payment_is_not_confirmed_yet() {
    let app = TestApp::spawn().await;
    let shirt = app.seed_product("TSH-4", "Henley", dec!(900), 5).await;

    let session = app
        .services
        .checkout
        .create_session(checkout_request(None, vec![(shirt.id, 1)], None))
        .await
        .unwrap();

    // No payment attempts recorded at the gateway
    let err = app
        .services
        .confirmation
        .confirm_payment(&session.gateway_order_id)
        .await
        .unwrap_err();
    match err {
        ServiceError::PaymentFailed(reason) => assert!(reason.contains("not completed yet")),
        other => panic!("expected PaymentFailed, got {:?}", other),
    }

    // The snapshot survives for a later retry
    assert_eq!(
        PendingCheckouts::find().all(&*app.db).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn failure_webhook_cancels_a_confirmed_order() {
    let app = TestApp::spawn().await;
    let shirt = app.seed_product("TSH-5", "Polo", dec!(1200), 5).await;

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

    app.services
        .confirmation
        .handle_webhook_event(PaymentWebhookEvent::Failed {
            gateway_order_id: session.gateway_order_id.clone(),
        })
        .await
        .unwrap();

    let updated = app.services.orders.get(order.id).await.unwrap();
    assert_eq!(updated.payment_status, PaymentStatus::Failed);
    assert_eq!(updated.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn failure_webhook_without_order_is_acknowledged() {
    let app = TestApp::spawn().await;

    // Nothing to cancel; still not an error back to the gateway
    app.services
        .confirmation
        .handle_webhook_event(PaymentWebhookEvent::Failed {
            gateway_order_id: "ORD_1700000000000_NOSUCH001".into(),
        })
        .await
        .unwrap();
}
