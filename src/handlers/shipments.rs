use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{errors::ServiceError, handlers::constant_time_eq, ApiResponse, AppState};

/// POST /api/v1/orders/:id/shipment
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/shipment",
    responses(
        (status = 200, description = "Shipment registered (or already present)"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Carrier unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Shipments"
)]
pub async fn create_shipment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let ids = state.services.shipments.create_shipment(id).await?;
    Ok(Json(ApiResponse::success(ids)))
}

#[derive(Debug, Deserialize, Default, utoipa::ToSchema)]
pub struct AssignCourierRequest {
    pub courier_id: Option<String>,
}

/// POST /api/v1/orders/:id/shipment/awb
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/shipment/awb",
    responses(
        (status = 200, description = "AWB assigned"),
        (status = 400, description = "No shipment registered", body = crate::errors::ErrorResponse),
        (status = 502, description = "Carrier unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Shipments"
)]
pub async fn assign_courier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AssignCourierRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .shipments
        .assign_courier(id, request.courier_id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /api/v1/orders/:id/shipment/pickup
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/shipment/pickup",
    responses(
        (status = 200, description = "Pickup requested; order moved to processing"),
        (status = 400, description = "No shipment registered", body = crate::errors::ErrorResponse)
    ),
    tag = "Shipments"
)]
pub async fn schedule_pickup(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.shipments.schedule_pickup(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// GET /api/v1/orders/:id/shipment/track
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/shipment/track",
    responses(
        (status = 200, description = "Carrier tracking data"),
        (status = 400, description = "No shipment registered", body = crate::errors::ErrorResponse)
    ),
    tag = "Shipments"
)]
pub async fn track_shipment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let tracking = state.services.shipments.track_shipment(id).await?;
    Ok(Json(ApiResponse::success(tracking)))
}

/// POST /api/v1/orders/:id/shipment/cancel
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/shipment/cancel",
    responses(
        (status = 200, description = "Shipment and order cancelled"),
        (status = 400, description = "No AWB assigned", body = crate::errors::ErrorResponse)
    ),
    tag = "Shipments"
)]
pub async fn cancel_shipment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.shipments.cancel_shipment(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /api/v1/shipments/webhook
///
/// Carrier push. Authenticated by a shared x-api-key when configured.
/// Always acknowledged with 200 (except auth failure) so the carrier does
/// not retry; resolution and status projection run after the ack.
#[utoipa::path(
    post,
    path = "/api/v1/shipments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted"),
        (status = 401, description = "Invalid API key", body = crate::errors::ErrorResponse)
    ),
    tag = "Shipments"
)]
pub async fn shipment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, ServiceError> {
    if let Some(expected) = &state.config.shipment_webhook_api_key {
        let provided = headers.get("x-api-key").and_then(|h| h.to_str().ok());
        if !provided.map(|key| constant_time_eq(key, expected)).unwrap_or(false) {
            warn!("Shipment webhook rejected; bad or missing x-api-key");
            return Err(ServiceError::Unauthorized("Invalid API key".into()));
        }
    }

    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(payload) => {
            let shipments = state.services.shipments.clone();
            tokio::spawn(async move {
                if let Err(e) = shipments.handle_shipment_webhook(payload).await {
                    error!("Shipment webhook processing failed: {}", e);
                }
            });
        }
        Err(e) => {
            warn!("Unparseable shipment webhook payload: {}", e);
        }
    }

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({"success": true})),
    ))
}
