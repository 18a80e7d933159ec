use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::checkout::create_checkout_session,
        handlers::payments::verify_payment,
        handlers::payments::payment_webhook,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::update_order_status,
        handlers::orders::cancel_order,
        handlers::shipments::create_shipment,
        handlers::shipments::assign_courier,
        handlers::shipments::schedule_pickup,
        handlers::shipments::track_shipment,
        handlers::shipments::cancel_shipment,
        handlers::shipments::shipment_webhook,
        handlers::coupons::list_coupons,
        handlers::coupons::create_coupon,
        handlers::coupons::update_coupon,
        handlers::coupons::deactivate_coupon,
        handlers::coupons::get_active_coupon,
        handlers::coupons::validate_coupon,
        handlers::inventory::list_products,
        handlers::inventory::get_product,
        handlers::inventory::check_availability,
        handlers::inventory::restock_product,
    ),
    components(schemas(crate::errors::ErrorResponse)),
    tags(
        (name = "Checkout", description = "Cart pricing and payment session creation"),
        (name = "Payments", description = "Payment verification and gateway webhooks"),
        (name = "Orders", description = "Order lifecycle"),
        (name = "Shipments", description = "Carrier orchestration and webhooks"),
        (name = "Coupons", description = "Coupon engine"),
        (name = "Inventory", description = "Product catalog and stock")
    ),
    info(
        title = "storefront-api",
        description = "E-commerce order, payment and inventory reconciliation API"
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at /docs, serving the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
