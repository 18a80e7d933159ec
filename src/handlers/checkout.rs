use axum::{extract::State, response::IntoResponse, Json};
use tracing::info;

use crate::{
    errors::ServiceError,
    services::checkout::{CheckoutRequest, CheckoutSession},
    ApiResponse, AppState,
};

/// POST /api/v1/checkout
///
/// Prices the cart server-side, opens a payment order at the gateway and
/// returns the session the storefront needs to launch the payment UI.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    responses(
        (status = 200, description = "Checkout session created"),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse),
        (status = 422, description = "Product unavailable or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session: CheckoutSession = state.services.checkout.create_session(request).await?;
    info!(gateway_order_id = %session.gateway_order_id, "Checkout session returned to client");
    Ok(Json(ApiResponse::success(session)))
}
