use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{errors::ServiceError, ApiResponse, AppState};

/// GET /api/v1/products
#[utoipa::path(
    get,
    path = "/api/v1/products",
    responses(
        (status = 200, description = "Available products")
    ),
    tag = "Inventory"
)]
pub async fn list_products(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state.services.inventory.list_available().await?;
    Ok(Json(ApiResponse::success(products)))
}

/// GET /api/v1/products/:id
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    responses(
        (status = 200, description = "Product detail"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Inventory"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.inventory.get_product(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    #[serde(default = "default_availability_quantity")]
    pub quantity: u32,
}

fn default_availability_quantity() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub product_id: Uuid,
    pub quantity: u32,
    pub available: bool,
}

/// GET /api/v1/products/:id/availability
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/availability",
    params(("quantity" = Option<u32>, Query, description = "Requested quantity, defaults to 1")),
    responses(
        (status = 200, description = "Whether the requested quantity can be fulfilled"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Inventory"
)]
pub async fn check_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let available = state
        .services
        .inventory
        .check_availability(id, query.quantity)
        .await?;
    Ok(Json(ApiResponse::success(AvailabilityResponse {
        product_id: id,
        quantity: query.quantity,
        available,
    })))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RestockRequest {
    pub quantity: u32,
}

/// POST /api/v1/products/:id/restock
#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/restock",
    responses(
        (status = 200, description = "Stock increased"),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Inventory"
)]
pub async fn restock_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RestockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state
        .services
        .inventory
        .restock(id, request.quantity)
        .await?;
    Ok(Json(ApiResponse::success(product)))
}
