use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::Engine;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, info, warn};

use crate::{
    errors::ServiceError,
    handlers::constant_time_eq,
    services::payment_confirmation::{parse_payment_webhook, PaymentWebhookEvent},
    ApiResponse, AppState,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct VerifyPaymentRequest {
    pub order_id: String,
}

/// POST /api/v1/payments/verify
///
/// Client-side poll after the gateway redirects back. Idempotent; a
/// repeated call returns the already-created order.
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    responses(
        (status = 200, description = "Payment confirmed; order returned"),
        (status = 402, description = "Payment not completed", body = crate::errors::ErrorResponse),
        (status = 410, description = "Checkout session expired", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .confirmation
        .confirm_payment(&request.order_id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /api/v1/payments/webhook
///
/// Gateway push. The contract with the gateway is 200 for everything it
/// should not retry; only a signature failure (with a secret configured)
/// earns a 401. Processing happens after the acknowledgement.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    match &state.config.payment_webhook_secret {
        Some(secret) => {
            if !verify_gateway_signature(
                &headers,
                &body,
                secret,
                state.config.payment_webhook_tolerance_secs,
            ) {
                warn!("Payment webhook signature verification failed");
                return Err(ServiceError::Unauthorized(
                    "Invalid webhook signature".into(),
                ));
            }
        }
        None => {
            warn!("Payment webhook accepted without signature verification; no secret configured");
        }
    }

    let event = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(json) => parse_payment_webhook(&json),
        Err(e) => {
            warn!("Unparseable payment webhook payload: {}", e);
            PaymentWebhookEvent::Unknown
        }
    };

    if event == PaymentWebhookEvent::Unknown {
        info!("Ignoring unrecognized payment webhook");
    } else {
        let confirmation = state.services.confirmation.clone();
        tokio::spawn(async move {
            if let Err(e) = confirmation.handle_webhook_event(event).await {
                if e.is_transient() {
                    error!("Payment webhook processing failed (transient): {}", e);
                } else {
                    warn!("Payment webhook processing failed: {}", e);
                }
            }
        });
    }

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({"success": true, "message": "Webhook received"})),
    ))
}

/// Gateway signature: base64(HMAC-SHA256(secret, timestamp + raw_body))
/// carried in x-webhook-signature with the timestamp in
/// x-webhook-timestamp.
fn verify_gateway_signature(
    headers: &HeaderMap,
    payload: &Bytes,
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    let (Some(ts), Some(sig)) = (
        headers
            .get("x-webhook-timestamp")
            .and_then(|h| h.to_str().ok()),
        headers
            .get("x-webhook-signature")
            .and_then(|h| h.to_str().ok()),
    ) else {
        return false;
    };

    if let Ok(ts_i) = ts.parse::<i64>() {
        let now = chrono::Utc::now().timestamp();
        if (now - ts_i).unsigned_abs() > tolerance_secs {
            return false;
        }
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(ts.as_bytes());
    mac.update(payload);
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    constant_time_eq(&expected, sig)
}
