/*!
 * # storefront-api
 *
 * Order, payment and inventory reconciliation backend: server-priced
 * checkout sessions, idempotent payment confirmation, stock ledger with
 * clamp-at-zero decrements, coupon engine and carrier-driven shipment
 * orchestration.
 */

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod mailer;
pub mod migrator;
pub mod openapi;
pub mod payment_gateway;
pub mod services;
pub mod shipping_gateway;

use crate::mailer::Mailer;
use crate::payment_gateway::PaymentGateway;
use crate::services::checkout::CheckoutPolicy;
use crate::shipping_gateway::ShippingGateway;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

/// The service graph. Built once at startup (or per test harness) from the
/// database pool and the external collaborators.
#[derive(Clone)]
pub struct AppServices {
    pub inventory: services::InventoryService,
    pub coupons: services::CouponService,
    pub checkout: services::CheckoutService,
    pub confirmation: services::PaymentConfirmationService,
    pub orders: services::OrderService,
    pub shipments: services::ShipmentService,
}

impl AppServices {
    pub fn build(
        db: Arc<DatabaseConnection>,
        event_sender: events::EventSender,
        config: &config::AppConfig,
        payment_gateway: Arc<dyn PaymentGateway>,
        shipping_gateway: Option<Arc<dyn ShippingGateway>>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let inventory = services::InventoryService::new(db.clone(), event_sender.clone());
        let coupons = services::CouponService::new(
            db.clone(),
            event_sender.clone(),
            config.reward_coupon_percentage,
            config.reward_coupon_validity_days,
        );
        let orders = services::OrderService::new(
            db.clone(),
            event_sender.clone(),
            config.currency.clone(),
        );
        let shipments = services::ShipmentService::new(
            db.clone(),
            event_sender.clone(),
            orders.clone(),
            shipping_gateway,
        );

        let policy = CheckoutPolicy {
            free_shipping_threshold: config.free_shipping_threshold,
            flat_shipping_fee: config.flat_shipping_fee,
            tax_rate: Decimal::from_f64_retain(config.tax_rate)
                .unwrap_or_else(|| Decimal::new(18, 2)),
            max_line_quantity: config.max_line_quantity,
            currency: config.currency.clone(),
            return_url: config.payment_return_url(),
            notify_url: config.payment_notify_url(),
            session_ttl: config.checkout_session_ttl(),
        };
        let checkout = services::CheckoutService::new(
            db.clone(),
            event_sender.clone(),
            inventory.clone(),
            coupons.clone(),
            payment_gateway.clone(),
            policy,
        );

        let confirmation = services::PaymentConfirmationService::new(
            db,
            event_sender,
            orders.clone(),
            inventory.clone(),
            coupons.clone(),
            shipments.clone(),
            payment_gateway,
            mailer,
            config.reward_coupon_threshold,
        );

        Self {
            inventory,
            coupons,
            checkout,
            confirmation,
            orders,
            shipments,
        }
    }
}

/// Common query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

/// Envelope wrapping every successful response body.
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<serde_json::Value> {
    let db_ok = db::check_connection(&state.db).await.is_ok();
    axum::Json(serde_json::json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": db_ok,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// All /api/v1 routes plus /health.
pub fn api_v1_routes() -> Router<AppState> {
    let api = Router::new()
        // Checkout
        .route("/checkout", post(handlers::checkout::create_checkout_session))
        // Payments
        .route("/payments/verify", post(handlers::payments::verify_payment))
        .route("/payments/webhook", post(handlers::payments::payment_webhook))
        // Orders
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/status",
            put(handlers::orders::update_order_status),
        )
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        // Shipments
        .route(
            "/orders/:id/shipment",
            post(handlers::shipments::create_shipment),
        )
        .route(
            "/orders/:id/shipment/awb",
            post(handlers::shipments::assign_courier),
        )
        .route(
            "/orders/:id/shipment/pickup",
            post(handlers::shipments::schedule_pickup),
        )
        .route(
            "/orders/:id/shipment/track",
            get(handlers::shipments::track_shipment),
        )
        .route(
            "/orders/:id/shipment/cancel",
            post(handlers::shipments::cancel_shipment),
        )
        .route(
            "/shipments/webhook",
            post(handlers::shipments::shipment_webhook),
        )
        // Coupons
        .route("/coupons", get(handlers::coupons::list_coupons))
        .route("/coupons", post(handlers::coupons::create_coupon))
        .route("/coupons/active", get(handlers::coupons::get_active_coupon))
        .route(
            "/coupons/validate",
            post(handlers::coupons::validate_coupon),
        )
        .route("/coupons/:id", put(handlers::coupons::update_coupon))
        .route("/coupons/:id", delete(handlers::coupons::deactivate_coupon))
        // Inventory
        .route("/products", get(handlers::inventory::list_products))
        .route("/products/:id", get(handlers::inventory::get_product))
        .route(
            "/products/:id/availability",
            get(handlers::inventory::check_availability),
        )
        .route(
            "/products/:id/restock",
            post(handlers::inventory::restock_product),
        );

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health_check))
}
