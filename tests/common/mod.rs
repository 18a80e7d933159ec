#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::{
    config::AppConfig,
    db::{establish_connection, run_migrations, DbPool},
    entities::product,
    errors::ServiceError,
    events::{process_events, EventSender},
    mailer::NoopMailer,
    payment_gateway::{
        CreateGatewayOrder, GatewayOrderSession, GatewayPayment, GatewayPaymentStatus,
        PaymentGateway,
    },
    services::checkout::{CheckoutAddress, CheckoutLineRequest, CheckoutRequest},
    shipping_gateway::{
        CarrierOrderCreated, CourierAssignment, CourierOption, CreateCarrierOrder,
        ShippingGateway, TrackingInfo,
    },
    AppServices,
};

/// Gateway stand-in: records calls and replays whatever payment attempts
/// the test scripted.
#[derive(Default)]
pub struct FakePaymentGateway {
    pub payments: Mutex<Vec<GatewayPayment>>,
    pub create_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl FakePaymentGateway {
    pub fn script_success(&self) {
        *self.payments.lock().unwrap() = vec![GatewayPayment {
            status: GatewayPaymentStatus::Success,
            payment_id: Some("CF123456".into()),
            payment_group: Some("upi".into()),
        }];
    }

    pub fn script_failure(&self) {
        *self.payments.lock().unwrap() = vec![GatewayPayment {
            status: GatewayPaymentStatus::Failed,
            payment_id: Some("CF123456".into()),
            payment_group: None,
        }];
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn create_order(
        &self,
        request: &CreateGatewayOrder,
    ) -> Result<GatewayOrderSession, ServiceError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayOrderSession {
            payment_session_id: format!("session_{}", request.gateway_order_id),
            gateway_order_id: request.gateway_order_id.clone(),
        })
    }

    async fn fetch_payments(
        &self,
        _gateway_order_id: &str,
    ) -> Result<Vec<GatewayPayment>, ServiceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.payments.lock().unwrap().clone())
    }
}

pub const FAKE_SHIPMENT_ORDER_ID: &str = "700123";
pub const FAKE_SHIPMENT_ID: &str = "880456";
pub const FAKE_AWB: &str = "AWB123456";

/// Carrier stand-in with fixed identifiers and call counters.
#[derive(Default)]
pub struct FakeShippingGateway {
    pub create_calls: AtomicUsize,
    pub assign_calls: AtomicUsize,
    pub pickup_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    /// Weights passed to serviceability lookups, in call order.
    pub recommend_weights: Mutex<Vec<Decimal>>,
}

#[async_trait]
impl ShippingGateway for FakeShippingGateway {
    async fn create_order(
        &self,
        _request: &CreateCarrierOrder,
    ) -> Result<CarrierOrderCreated, ServiceError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CarrierOrderCreated {
            shipment_order_id: FAKE_SHIPMENT_ORDER_ID.into(),
            shipment_id: FAKE_SHIPMENT_ID.into(),
            status: Some("NEW".into()),
        })
    }

    async fn assign_courier(
        &self,
        _shipment_id: &str,
        courier_id: Option<&str>,
    ) -> Result<CourierAssignment, ServiceError> {
        self.assign_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CourierAssignment {
            awb_code: FAKE_AWB.into(),
            courier_id: Some(courier_id.unwrap_or("24").to_string()),
            courier_name: Some("Bluedart".into()),
        })
    }

    async fn recommend_courier(
        &self,
        _delivery_pincode: &str,
        weight_kg: Decimal,
    ) -> Result<Vec<CourierOption>, ServiceError> {
        self.recommend_weights.lock().unwrap().push(weight_kg);
        Ok(vec![CourierOption {
            courier_id: "24".into(),
            courier_name: "Bluedart".into(),
            rate: dec!(60),
            estimated_delivery_days: Some("3".into()),
        }])
    }

    async fn schedule_pickup(&self, _shipment_id: &str) -> Result<(), ServiceError> {
        self.pickup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn track(&self, _shipment_id: &str) -> Result<TrackingInfo, ServiceError> {
        Ok(TrackingInfo {
            current_status: Some("IN TRANSIT".into()),
            awb_code: Some(FAKE_AWB.into()),
            courier_name: Some("Bluedart".into()),
            events: serde_json::json!({}),
        })
    }

    async fn cancel(&self, _awb_code: &str) -> Result<(), ServiceError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct TestApp {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    pub payment: Arc<FakePaymentGateway>,
    pub shipping: Arc<FakeShippingGateway>,
    _tmp: tempfile::TempDir,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: String::new(),
        host: "127.0.0.1".into(),
        port: 0,
        environment: "development".into(),
        log_level: "info".into(),
        log_json: false,
        auto_migrate: false,
        cors_allowed_origins: None,
        cors_allow_any_origin: false,
        db_max_connections: 4,
        db_min_connections: 1,
        db_connect_timeout_secs: 10,
        db_acquire_timeout_secs: 8,
        frontend_url: "http://localhost:8080".into(),
        backend_url: "http://localhost:8000".into(),
        currency: "INR".into(),
        payment_api_base: "http://localhost:1".into(),
        payment_client_id: "test".into(),
        payment_client_secret: "test".into(),
        payment_webhook_secret: None,
        payment_webhook_tolerance_secs: 300,
        shipping_api_base: "http://localhost:1".into(),
        shipping_email: None,
        shipping_password: None,
        shipping_pickup_location: "Primary".into(),
        shipping_pickup_pincode: Some("110001".into()),
        shipment_webhook_api_key: None,
        mail_dispatch_url: None,
        mail_from: "orders@storefront.example".into(),
        free_shipping_threshold: dec!(5000),
        flat_shipping_fee: dec!(99),
        tax_rate: 0.18,
        reward_coupon_threshold: dec!(20000),
        reward_coupon_percentage: 5,
        reward_coupon_validity_days: 30,
        max_line_quantity: 100,
        checkout_session_ttl_secs: 3600,
        session_sweep_interval_secs: 300,
        external_timeout_secs: 5,
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        let tmp = tempfile::tempdir().expect("temp dir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            tmp.path().join("storefront-test.db").display()
        );
        let db = establish_connection(&url).await.expect("connect");
        run_migrations(&db).await.expect("migrate");
        let db = Arc::new(db);

        let (tx, rx) = mpsc::channel(256);
        let event_sender = EventSender::new(tx);
        tokio::spawn(process_events(rx));

        let payment = Arc::new(FakePaymentGateway::default());
        let shipping = Arc::new(FakeShippingGateway::default());
        let config = test_config();

        let services = AppServices::build(
            db.clone(),
            event_sender,
            &config,
            payment.clone(),
            Some(shipping.clone() as Arc<dyn ShippingGateway>),
            Arc::new(NoopMailer),
        );

        Self {
            db,
            services,
            payment,
            shipping,
            _tmp: tmp,
        }
    }

    pub async fn seed_product(
        &self,
        sku: &str,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> product::Model {
        self.seed_product_weighing(sku, name, price, stock, dec!(0.3))
            .await
    }

    pub async fn seed_product_weighing(
        &self,
        sku: &str,
        name: &str,
        price: Decimal,
        stock: i32,
        weight_kg: Decimal,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(name.to_string()),
            description: Set(None),
            price: Set(price),
            stock: Set(stock),
            is_available: Set(stock > 0),
            sold_count: Set(0),
            weight_kg: Set(Some(weight_kg)),
            hsn_code: Set(Some("6109".into())),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }
}

pub fn sample_address() -> CheckoutAddress {
    CheckoutAddress {
        full_name: "Asha Rao".into(),
        address_line1: "12 MG Road".into(),
        address_line2: None,
        city: "Bengaluru".into(),
        state: "Karnataka".into(),
        country: "India".into(),
        pincode: "560001".into(),
        phone: "9876543210".into(),
    }
}

pub fn checkout_request(
    user_id: Option<&str>,
    items: Vec<(Uuid, u32)>,
    coupon_code: Option<&str>,
) -> CheckoutRequest {
    CheckoutRequest {
        user_id: user_id.map(str::to_string),
        customer_name: "Asha Rao".into(),
        customer_email: "asha@example.com".into(),
        customer_phone: "9876543210".into(),
        items: items
            .into_iter()
            .map(|(product_id, quantity)| CheckoutLineRequest {
                product_id,
                quantity,
            })
            .collect(),
        coupon_code: coupon_code.map(str::to_string),
        shipping_address: sample_address(),
    }
}
