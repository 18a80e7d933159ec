use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::order::{self, OrderStatus},
    entities::order_item,
    errors::ServiceError,
    ApiResponse, AppState, ListQuery, PaginatedResponse,
};

fn map_status_str(status: &str) -> Result<OrderStatus, ServiceError> {
    match status.to_ascii_lowercase().as_str() {
        "pending" => Ok(OrderStatus::Pending),
        "processing" => Ok(OrderStatus::Processing),
        "shipped" => Ok(OrderStatus::Shipped),
        "delivered" => Ok(OrderStatus::Delivered),
        "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
        other => Err(ServiceError::InvalidInput(format!(
            "Unknown order status: {other}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderListFilter {
    pub user_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// GET /api/v1/orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses(
        (status = 200, description = "Paginated order list")
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(pagination): Query<ListQuery>,
    Query(filter): Query<OrderListFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = filter.status.as_deref().map(map_status_str).transpose()?;
    let (items, total) = state
        .services
        .orders
        .list(
            pagination.page,
            pagination.limit,
            filter.user_id.as_deref(),
            status,
        )
        .await?;

    let total_pages = total.div_ceil(pagination.limit.max(1));
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page: pagination.page,
        limit: pagination.limit,
        total_pages,
    })))
}

/// GET /api/v1/orders/:id
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    responses(
        (status = 200, description = "Order with line items"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, items) = state.services.orders.get_with_items(id).await?;
    Ok(Json(ApiResponse::success(OrderWithItems { order, items })))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// PUT /api/v1/orders/:id/status
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    responses(
        (status = 200, description = "Order status updated"),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let next = map_status_str(&request.status)?;
    let updated = state.services.orders.update_status(id, next).await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// POST /api/v1/orders/:id/cancel
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    responses(
        (status = 200, description = "Order cancelled"),
        (status = 400, description = "Order can no longer be cancelled", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cancelled = state.services.orders.cancel(id).await?;
    Ok(Json(ApiResponse::success(cancelled)))
}
