use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::coupons::{CreateCoupon, UpdateCoupon},
    ApiResponse, AppState, ListQuery, PaginatedResponse,
};

#[derive(Debug, Deserialize)]
pub struct CouponListFilter {
    pub active: Option<bool>,
}

/// GET /api/v1/coupons
#[utoipa::path(
    get,
    path = "/api/v1/coupons",
    responses(
        (status = 200, description = "Paginated coupon list")
    ),
    tag = "Coupons"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    Query(pagination): Query<ListQuery>,
    Query(filter): Query<CouponListFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let (items, total) = state
        .services
        .coupons
        .list(pagination.page, pagination.limit, filter.active)
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

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateCouponRequest {
    pub code: String,
    pub discount_percentage: i32,
    pub expires_at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub usage_limit: Option<i32>,
}

/// POST /api/v1/coupons
#[utoipa::path(
    post,
    path = "/api/v1/coupons",
    responses(
        (status = 200, description = "Coupon created"),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 409, description = "Duplicate code or user already holds an active coupon", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    Json(request): Json<CreateCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state
        .services
        .coupons
        .create(CreateCoupon {
            code: request.code,
            discount_percentage: request.discount_percentage,
            expires_at: request.expires_at,
            user_id: request.user_id,
            usage_limit: request.usage_limit,
        })
        .await?;
    Ok(Json(ApiResponse::success(created)))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateCouponRequest {
    pub discount_percentage: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

/// PUT /api/v1/coupons/:id
#[utoipa::path(
    put,
    path = "/api/v1/coupons/{id}",
    responses(
        (status = 200, description = "Coupon updated"),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .services
        .coupons
        .update(
            id,
            UpdateCoupon {
                discount_percentage: request.discount_percentage,
                expires_at: request.expires_at,
                is_active: request.is_active,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// DELETE /api/v1/coupons/:id
#[utoipa::path(
    delete,
    path = "/api/v1/coupons/{id}",
    responses(
        (status = 200, description = "Coupon deactivated"),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn deactivate_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.coupons.deactivate(id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "deactivated": true
    }))))
}

#[derive(Debug, Deserialize)]
pub struct ActiveCouponQuery {
    pub user_id: String,
}

/// GET /api/v1/coupons/active
#[utoipa::path(
    get,
    path = "/api/v1/coupons/active",
    responses(
        (status = 200, description = "The user's active coupon, or null")
    ),
    tag = "Coupons"
)]
pub async fn get_active_coupon(
    State(state): State<AppState>,
    Query(query): Query<ActiveCouponQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon = state
        .services
        .coupons
        .active_coupon_for_user(&query.user_id)
        .await?;
    Ok(Json(ApiResponse::success(coupon)))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub user_id: Option<String>,
}

/// POST /api/v1/coupons/validate
#[utoipa::path(
    post,
    path = "/api/v1/coupons/validate",
    responses(
        (status = 200, description = "Coupon is valid"),
        (status = 400, description = "Coupon invalid, expired or exhausted", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let validated = state
        .services
        .coupons
        .validate(&request.code, request.user_id.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "code": validated.code,
        "discount_percentage": validated.discount_percentage,
    }))))
}
